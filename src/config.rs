//! Credential and policy resolution.
//!
//! Raw invocation inputs become a validated [`CredentialSet`] or
//! [`ServerPolicy`] here, before any socket exists. The resolver itself
//! performs no I/O; the loading helpers at the bottom of this module are
//! invoked only by the binary entry point.

use crate::pin::{BreakSignature, Pin};
use crate::verifier::VerifierStore;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration failures. Always fatal, always detected before network
/// activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("must specify CERT and KEY together")]
    CertKeyMismatch,

    #[error("must specify USER with PASS")]
    UserPassMismatch,

    #[error("can use SRP or client cert for auth, not both")]
    AmbiguousClientAuth,

    #[error("must specify CERT with PIN")]
    PinWithoutCert,

    #[error("address must be HOST:PORT, got '{0}'")]
    MalformedAddress(String),

    #[error("invalid port in '{0}'")]
    InvalidPort(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {0}")]
    EmptyCertFile(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("malformed {what} file {path}: {source}")]
    MalformedStore {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How the client authenticates itself. Fixed once at resolution time so
/// downstream code matches on the variant instead of re-deriving the mode
/// from field presence.
#[derive(Debug)]
pub enum CredentialSet {
    CertAuth {
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    },
    PasswordAuth {
        username: String,
        password: String,
    },
    None,
}

impl CredentialSet {
    pub fn is_password_auth(&self) -> bool {
        matches!(self, CredentialSet::PasswordAuth { .. })
    }
}

/// Server certificate chain plus its private key.
#[derive(Debug)]
pub struct ServerIdentity {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Everything the server-side handshake negotiates against. The policy may
/// support certificate and password mechanisms simultaneously; which one a
/// given connection attempts is only known per connection.
#[derive(Debug, Default)]
pub struct ServerPolicy {
    pub identity: Option<ServerIdentity>,
    pub verifiers: Option<VerifierStore>,
    pub pin: Option<Pin>,
    pub break_signatures: Vec<BreakSignature>,
    pub require_client_cert: bool,
}

/// Resolve client credentials. Cert and key travel together, username and
/// password travel together, and the two mechanisms are mutually
/// exclusive.
pub fn resolve_client(
    key: Option<PrivateKeyDer<'static>>,
    chain: Option<Vec<CertificateDer<'static>>>,
    username: Option<String>,
    password: Option<String>,
) -> Result<CredentialSet, ConfigError> {
    let identity = match (chain, key) {
        (Some(chain), Some(key)) => Some((chain, key)),
        (None, None) => None,
        _ => return Err(ConfigError::CertKeyMismatch),
    };
    let login = match (username, password) {
        (Some(username), Some(password)) => Some((username, password)),
        (None, None) => None,
        _ => return Err(ConfigError::UserPassMismatch),
    };
    match (identity, login) {
        (Some(_), Some(_)) => Err(ConfigError::AmbiguousClientAuth),
        (Some((chain, key)), None) => Ok(CredentialSet::CertAuth { chain, key }),
        (None, Some((username, password))) => Ok(CredentialSet::PasswordAuth { username, password }),
        (None, None) => Ok(CredentialSet::None),
    }
}

/// Resolve the server policy. A pin cannot be offered without a
/// certificate chain to anchor it.
pub fn resolve_server(
    key: Option<PrivateKeyDer<'static>>,
    chain: Option<Vec<CertificateDer<'static>>>,
    pin: Option<Pin>,
    break_signatures: Vec<BreakSignature>,
    verifiers: Option<VerifierStore>,
    require_client_cert: bool,
) -> Result<ServerPolicy, ConfigError> {
    let identity = match (chain, key) {
        (Some(chain), Some(key)) => Some(ServerIdentity { chain, key }),
        (None, None) => None,
        _ => return Err(ConfigError::CertKeyMismatch),
    };
    if pin.is_some() && identity.is_none() {
        return Err(ConfigError::PinWithoutCert);
    }
    Ok(ServerPolicy {
        identity,
        verifiers,
        pin,
        break_signatures,
        require_client_cert,
    })
}

/// Parse a `HOST:PORT` address string. Fails before any socket exists.
pub fn parse_address(address: &str) -> Result<(String, u16), ConfigError> {
    let parts: Vec<&str> = address.split(':').collect();
    if parts.len() != 2 || parts[0].is_empty() {
        return Err(ConfigError::MalformedAddress(address.to_string()));
    }
    let port = parts[1]
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort(address.to_string()))?;
    Ok((parts[0].to_string(), port))
}

/// Load a PEM certificate chain from disk.
pub fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(ConfigError::EmptyCertFile(path.to_path_buf()));
    }
    Ok(certs)
}

/// Load a PEM private key from disk.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| ConfigError::NoPrivateKey(path.to_path_buf()))
}

fn load_json<T: serde::de::DeserializeOwned>(
    path: &Path,
    what: &'static str,
) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::MalformedStore {
        what,
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_pin(path: &Path) -> Result<Pin, ConfigError> {
    load_json(path, "pin")
}

pub fn load_break_signatures(path: &Path) -> Result<Vec<BreakSignature>, ConfigError> {
    load_json(path, "break signatures")
}

pub fn load_verifier_store(path: &Path) -> Result<VerifierStore, ConfigError> {
    load_json(path, "verifier store")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert() -> Vec<CertificateDer<'static>> {
        vec![CertificateDer::from(vec![0x30, 0x82, 0x01, 0x00])]
    }

    fn key() -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(vec![0x30, 0x2e].into())
    }

    #[test]
    fn cert_without_key_is_rejected() {
        let err = resolve_client(None, Some(cert()), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::CertKeyMismatch));
        let err = resolve_client(Some(key()), None, None, None).unwrap_err();
        assert!(matches!(err, ConfigError::CertKeyMismatch));
    }

    #[test]
    fn cert_and_key_together_are_accepted() {
        let creds = resolve_client(Some(key()), Some(cert()), None, None).unwrap();
        assert!(matches!(creds, CredentialSet::CertAuth { .. }));
    }

    #[test]
    fn username_without_password_is_rejected() {
        let err = resolve_client(None, None, Some("alice".into()), None).unwrap_err();
        assert!(matches!(err, ConfigError::UserPassMismatch));
        let err = resolve_client(None, None, None, Some("pw".into())).unwrap_err();
        assert!(matches!(err, ConfigError::UserPassMismatch));
    }

    #[test]
    fn srp_and_client_cert_are_mutually_exclusive() {
        let err = resolve_client(
            Some(key()),
            Some(cert()),
            Some("alice".into()),
            Some("pw".into()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousClientAuth));
    }

    #[test]
    fn no_credentials_resolves_to_none() {
        let creds = resolve_client(None, None, None, None).unwrap();
        assert!(matches!(creds, CredentialSet::None));
        assert!(!creds.is_password_auth());
    }

    #[test]
    fn password_auth_flag() {
        let creds = resolve_client(None, None, Some("alice".into()), Some("pw".into())).unwrap();
        assert!(creds.is_password_auth());
    }

    #[test]
    fn server_pin_requires_certificate() {
        let pin = Pin {
            key_fingerprint: "ab".into(),
            generation: 0,
            expiration: 0,
        };
        let err = resolve_server(None, None, Some(pin.clone()), Vec::new(), None, false).unwrap_err();
        assert!(matches!(err, ConfigError::PinWithoutCert));

        let policy =
            resolve_server(Some(key()), Some(cert()), Some(pin), Vec::new(), None, false).unwrap();
        assert!(policy.identity.is_some());
        assert!(policy.pin.is_some());
    }

    #[test]
    fn server_cert_key_pairing_enforced() {
        let err = resolve_server(None, Some(cert()), None, Vec::new(), None, false).unwrap_err();
        assert!(matches!(err, ConfigError::CertKeyMismatch));
    }

    #[test]
    fn empty_server_policy_is_valid() {
        let policy = resolve_server(None, None, None, Vec::new(), None, true).unwrap();
        assert!(policy.identity.is_none());
        assert!(policy.require_client_cert);
    }

    #[test]
    fn address_parsing() {
        assert_eq!(parse_address("localhost:4443").unwrap(), ("localhost".into(), 4443));
        assert_eq!(parse_address("127.0.0.1:0").unwrap(), ("127.0.0.1".into(), 0));
        assert!(matches!(
            parse_address("localhost"),
            Err(ConfigError::MalformedAddress(_))
        ));
        assert!(matches!(
            parse_address(":443"),
            Err(ConfigError::MalformedAddress(_))
        ));
        assert!(matches!(
            parse_address("host:port:extra"),
            Err(ConfigError::MalformedAddress(_))
        ));
        assert!(matches!(
            parse_address("localhost:http"),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            parse_address("localhost:99999"),
            Err(ConfigError::InvalidPort(_))
        ));
    }
}
