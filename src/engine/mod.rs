//! Handshake engine.
//!
//! The driver core consumes this module through two calls:
//! [`client::handshake`] and [`server::handshake`]. Both return a
//! negotiated [`Session`] or an [`EngineError`] whose `Alert` variant
//! feeds the classifier. The engine carries no record-layer cryptography;
//! it negotiates version, cipher, identities, pinning data and resumption
//! over framed messages and reports exactly the session state and alert
//! semantics the drivers exist to exercise.

pub mod client;
pub mod server;
pub mod wire;

use crate::alert::Alert;
use crate::cache::SessionId;
use crate::pin::PinBundle;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Negotiable protocol versions, oldest first so `Ord` prefers newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolVersion {
    Tls12,
    Tls13,
}

impl ProtocolVersion {
    pub const SUPPORTED: [ProtocolVersion; 2] = [ProtocolVersion::Tls13, ProtocolVersion::Tls12];

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolVersion::Tls12 => "TLSv1.2",
            ProtocolVersion::Tls13 => "TLSv1.3",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cipher suites this engine will negotiate, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherSuite {
    Aes256GcmSha384,
    Aes128GcmSha256,
    Chacha20Poly1305Sha256,
}

impl CipherSuite {
    pub const SUPPORTED: [CipherSuite; 3] = [
        CipherSuite::Aes256GcmSha384,
        CipherSuite::Aes128GcmSha256,
        CipherSuite::Chacha20Poly1305Sha256,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CipherSuite::Aes256GcmSha384 => "TLS_AES_256_GCM_SHA384",
            CipherSuite::Aes128GcmSha256 => "TLS_AES_128_GCM_SHA256",
            CipherSuite::Chacha20Poly1305Sha256 => "TLS_CHACHA20_POLY1305_SHA256",
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Implementation tag reported next to the cipher name.
pub const CIPHER_IMPLEMENTATION: &str = "pure-rust";

/// Negotiated session state. Created at handshake completion, immutable,
/// owned by the connection, discarded at close.
#[derive(Debug, Clone)]
pub struct Session {
    pub version: ProtocolVersion,
    pub cipher: CipherSuite,
    pub srp_username: Option<String>,
    pub client_cert_fingerprint: Option<String>,
    pub server_cert_fingerprint: Option<String>,
    pub pinning: Option<PinBundle>,
    pub resumption_id: Option<SessionId>,
    pub resumed: bool,
}

/// SHA-256 fingerprint of a DER-encoded certificate.
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Handshake failures as seen by the drivers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The handshake ended with a protocol alert. `password_auth` records
    /// whether this attempt used password authentication, which the
    /// classifier needs to interpret the reason code.
    #[error("{alert}")]
    Alert { alert: Alert, password_auth: bool },

    /// Finished verify data did not match the local transcript.
    #[error("handshake transcript mismatch")]
    TranscriptMismatch,

    #[error("unexpected handshake message, expected {expected}")]
    Unexpected { expected: &'static str },

    #[error("malformed {field} field in handshake message")]
    Malformed { field: &'static str },

    #[error(transparent)]
    Wire(#[from] wire::WireError),
}

/// Running hash over handshake frames, checked via the Finished message.
#[derive(Default)]
pub(crate) struct Transcript {
    hasher: Sha256,
}

impl Transcript {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update(&mut self, payload: &[u8]) {
        self.hasher.update(payload);
    }

    pub(crate) fn verify_data(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
