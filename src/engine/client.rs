//! Client-side handshake.

use crate::alert::Alert;
use crate::cache::SessionId;
use crate::config::CredentialSet;
use crate::engine::wire::{self, HandshakeMessage};
use crate::engine::{fingerprint, CipherSuite, EngineError, ProtocolVersion, Session, Transcript};
use crate::verifier::compute_proof;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Perform one client handshake over an established stream.
///
/// Exactly one authentication mode is attempted: password-based for
/// [`CredentialSet::PasswordAuth`], certificate-based otherwise (the chain
/// may be empty for anonymous negotiation). `resume` offers a previously
/// negotiated session identifier back to the server.
pub async fn handshake<S>(
    stream: &mut S,
    credentials: &CredentialSet,
    request_pinning: bool,
    resume: Option<&SessionId>,
) -> Result<Session, EngineError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let password_auth = credentials.is_password_auth();
    let mut transcript = Transcript::new();

    let srp_username = match credentials {
        CredentialSet::PasswordAuth { username, .. } => Some(username.clone()),
        _ => None,
    };
    let hello = HandshakeMessage::ClientHello {
        versions: ProtocolVersion::SUPPORTED.to_vec(),
        ciphers: CipherSuite::SUPPORTED.to_vec(),
        srp_username: srp_username.clone(),
        session_id: resume.cloned(),
        request_pinning,
    };
    transcript.update(&wire::send(stream, &hello).await?);

    let (message, payload) = wire::recv(stream).await?;
    let (version, cipher, session_id, resumed, srp_salt, server_chain, cert_request, pinning) =
        match message {
            HandshakeMessage::ServerHello {
                version,
                cipher,
                session_id,
                resumed,
                srp_salt,
                cert_chain,
                cert_request,
                pinning,
            } => (
                version, cipher, session_id, resumed, srp_salt, cert_chain, cert_request, pinning,
            ),
            HandshakeMessage::Alert { description } => {
                return Err(EngineError::Alert {
                    alert: Alert::remote(description),
                    password_auth,
                });
            }
            _ => {
                return Err(EngineError::Unexpected {
                    expected: "ServerHello",
                })
            }
        };
    transcript.update(&payload);
    debug!(%version, %cipher, resumed, "received ServerHello");

    let srp_proof = match credentials {
        CredentialSet::PasswordAuth { password, .. } if !resumed => {
            let salt_hex = srp_salt
                .as_deref()
                .ok_or(EngineError::Malformed { field: "srp_salt" })?;
            let salt =
                hex::decode(salt_hex).map_err(|_| EngineError::Malformed { field: "srp_salt" })?;
            Some(compute_proof(&salt, password))
        }
        _ => None,
    };
    let client_chain = match credentials {
        CredentialSet::CertAuth { chain, .. } if !resumed && !chain.is_empty() => {
            Some(chain.iter().map(|c| hex::encode(c.as_ref())).collect::<Vec<_>>())
        }
        _ => None,
    };
    // A certificate request we cannot satisfy is still answered with an
    // empty ClientKeys; rejecting it is the server's decision.
    let _ = cert_request;

    let keys = HandshakeMessage::ClientKeys {
        srp_proof,
        cert_chain: client_chain.clone(),
    };
    transcript.update(&wire::send(stream, &keys).await?);

    let (message, _) = wire::recv(stream).await?;
    match message {
        HandshakeMessage::Finished { verify_data } => {
            if verify_data != transcript.verify_data() {
                return Err(EngineError::TranscriptMismatch);
            }
        }
        HandshakeMessage::Alert { description } => {
            return Err(EngineError::Alert {
                alert: Alert::remote(description),
                password_auth,
            });
        }
        _ => {
            return Err(EngineError::Unexpected {
                expected: "Finished",
            })
        }
    }

    let client_cert_fingerprint = client_chain.as_ref().and_then(|chain| {
        chain
            .first()
            .and_then(|leaf| hex::decode(leaf).ok())
            .map(|der| fingerprint(&der))
    });
    let server_cert_fingerprint = match server_chain.as_ref().and_then(|c| c.first()) {
        Some(leaf) => Some(fingerprint(
            &hex::decode(leaf).map_err(|_| EngineError::Malformed { field: "cert_chain" })?,
        )),
        None => None,
    };

    Ok(Session {
        version,
        cipher,
        srp_username,
        client_cert_fingerprint,
        server_cert_fingerprint,
        pinning,
        resumption_id: Some(session_id),
        resumed,
    })
}
