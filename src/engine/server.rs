//! Server-side handshake.

use crate::alert::{Alert, AlertDescription};
use crate::cache::{CachedSession, SessionCache};
use crate::config::ServerPolicy;
use crate::engine::wire::{self, HandshakeMessage};
use crate::engine::{fingerprint, CipherSuite, EngineError, ProtocolVersion, Session, Transcript};
use crate::pin::PinBundle;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Send a rejection alert to the peer and surface it locally.
async fn reject<S>(
    stream: &mut S,
    description: AlertDescription,
    password_auth: bool,
) -> EngineError
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let message = HandshakeMessage::Alert { description };
    if let Err(e) = wire::send(stream, &message).await {
        return e.into();
    }
    EngineError::Alert {
        alert: Alert::local(description),
        password_auth,
    }
}

/// Perform one server handshake over an accepted stream.
///
/// Negotiates against `policy` and uses `cache` for resumption lookup and
/// storage. Which authentication mechanism applies is decided by this
/// connection's ClientHello, not by the policy: the returned error's
/// `password_auth` flag reflects the attempt actually made.
pub async fn handshake<S>(
    stream: &mut S,
    policy: &ServerPolicy,
    cache: &SessionCache,
) -> Result<Session, EngineError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut transcript = Transcript::new();

    let (message, payload) = wire::recv(stream).await?;
    let (versions, ciphers, srp_username, offered_session, request_pinning) = match message {
        HandshakeMessage::ClientHello {
            versions,
            ciphers,
            srp_username,
            session_id,
            request_pinning,
        } => (versions, ciphers, srp_username, session_id, request_pinning),
        HandshakeMessage::Alert { description } => {
            return Err(EngineError::Alert {
                alert: Alert::remote(description),
                password_auth: false,
            });
        }
        _ => {
            return Err(EngineError::Unexpected {
                expected: "ClientHello",
            })
        }
    };
    transcript.update(&payload);
    let password_auth = srp_username.is_some();

    // Resumption: a cache hit short-circuits negotiation and restores the
    // identities from the prior session.
    if let Some(id) = offered_session.as_deref() {
        if let Some(cached) = cache.get(id) {
            debug!(session_id = id, "resuming cached session");
            return resume(stream, transcript, id.to_string(), cached, password_auth).await;
        }
        debug!(session_id = id, "resumption identifier not in cache");
    }

    let version = match versions
        .iter()
        .filter(|v| ProtocolVersion::SUPPORTED.contains(v))
        .max()
    {
        Some(v) => *v,
        None => return Err(reject(stream, AlertDescription::HandshakeFailure, password_auth).await),
    };
    let cipher = match ciphers
        .iter()
        .find(|c| CipherSuite::SUPPORTED.contains(c))
    {
        Some(c) => *c,
        None => return Err(reject(stream, AlertDescription::HandshakeFailure, password_auth).await),
    };

    let server_chain_hex: Option<Vec<String>> = policy
        .identity
        .as_ref()
        .map(|id| id.chain.iter().map(|c| hex::encode(c.as_ref())).collect());

    // Password mode needs a verifier entry; certificate mode needs a
    // server identity. Either shortfall is a negotiation failure, an
    // unknown user or bad proof is a credential failure.
    let verifier_entry = match srp_username.as_deref() {
        Some(username) => {
            let store = match policy.verifiers.as_ref() {
                Some(store) => store,
                None => {
                    return Err(
                        reject(stream, AlertDescription::HandshakeFailure, password_auth).await
                    )
                }
            };
            match store.lookup(username) {
                Some(entry) => Some(entry.clone()),
                None => {
                    return Err(
                        reject(stream, AlertDescription::UnknownPskIdentity, password_auth).await
                    )
                }
            }
        }
        None => {
            if server_chain_hex.is_none() {
                return Err(reject(stream, AlertDescription::HandshakeFailure, password_auth).await);
            }
            None
        }
    };

    let session_id = hex::encode(rand::random::<[u8; 16]>());
    let cert_request = !password_auth && policy.require_client_cert;
    let pinning = match (&policy.pin, request_pinning) {
        (Some(pin), true) => Some(PinBundle {
            pin: pin.clone(),
            break_signatures: policy.break_signatures.clone(),
        }),
        _ => None,
    };

    let hello = HandshakeMessage::ServerHello {
        version,
        cipher,
        session_id: session_id.clone(),
        resumed: false,
        srp_salt: verifier_entry.as_ref().map(|e| e.salt.clone()),
        cert_chain: server_chain_hex.clone(),
        cert_request,
        pinning: pinning.clone(),
    };
    transcript.update(&wire::send(stream, &hello).await?);

    let (message, payload) = wire::recv(stream).await?;
    let (srp_proof, client_chain) = match message {
        HandshakeMessage::ClientKeys {
            srp_proof,
            cert_chain,
        } => (srp_proof, cert_chain),
        HandshakeMessage::Alert { description } => {
            return Err(EngineError::Alert {
                alert: Alert::remote(description),
                password_auth,
            });
        }
        _ => {
            return Err(EngineError::Unexpected {
                expected: "ClientKeys",
            })
        }
    };
    transcript.update(&payload);

    if let Some(entry) = verifier_entry.as_ref() {
        match srp_proof.as_deref() {
            Some(proof) if proof == entry.verifier => {}
            _ => return Err(reject(stream, AlertDescription::BadRecordMac, password_auth).await),
        }
    }
    if cert_request && client_chain.is_none() {
        return Err(reject(stream, AlertDescription::HandshakeFailure, password_auth).await);
    }

    let client_cert_fingerprint = match client_chain.as_ref().and_then(|c| c.first()) {
        Some(leaf) => Some(fingerprint(
            &hex::decode(leaf).map_err(|_| EngineError::Malformed { field: "cert_chain" })?,
        )),
        None => None,
    };
    let server_cert_fingerprint = policy
        .identity
        .as_ref()
        .and_then(|id| id.chain.first())
        .map(|leaf| fingerprint(leaf.as_ref()));

    let finished = HandshakeMessage::Finished {
        verify_data: transcript.verify_data(),
    };
    wire::send(stream, &finished).await?;

    cache.put(
        session_id.clone(),
        CachedSession {
            version,
            cipher,
            srp_username: srp_username.clone(),
            client_cert_fingerprint: client_cert_fingerprint.clone(),
            server_cert_fingerprint: server_cert_fingerprint.clone(),
        },
    );

    Ok(Session {
        version,
        cipher,
        srp_username,
        client_cert_fingerprint,
        server_cert_fingerprint,
        pinning,
        resumption_id: Some(session_id),
        resumed: false,
    })
}

async fn resume<S>(
    stream: &mut S,
    mut transcript: Transcript,
    session_id: String,
    cached: CachedSession,
    password_auth: bool,
) -> Result<Session, EngineError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hello = HandshakeMessage::ServerHello {
        version: cached.version,
        cipher: cached.cipher,
        session_id: session_id.clone(),
        resumed: true,
        srp_salt: None,
        cert_chain: None,
        cert_request: false,
        pinning: None,
    };
    transcript.update(&wire::send(stream, &hello).await?);

    let (message, payload) = wire::recv(stream).await?;
    match message {
        HandshakeMessage::ClientKeys { .. } => {}
        HandshakeMessage::Alert { description } => {
            return Err(EngineError::Alert {
                alert: Alert::remote(description),
                password_auth,
            });
        }
        _ => {
            return Err(EngineError::Unexpected {
                expected: "ClientKeys",
            })
        }
    }
    transcript.update(&payload);

    let finished = HandshakeMessage::Finished {
        verify_data: transcript.verify_data(),
    };
    wire::send(stream, &finished).await?;

    Ok(Session {
        version: cached.version,
        cipher: cached.cipher,
        srp_username: cached.srp_username,
        client_cert_fingerprint: cached.client_cert_fingerprint,
        server_cert_fingerprint: cached.server_cert_fingerprint,
        pinning: None,
        resumption_id: Some(session_id),
        resumed: true,
    })
}
