//! Handshake message framing.
//!
//! Wire format:
//!
//! ```text
//! +----------+-----------+----------+
//! | Magic(4) | Length(4) | Payload  |
//! +----------+-----------+----------+
//! ```
//!
//! Payload is a JSON-encoded [`HandshakeMessage`]. The length prefix is a
//! big-endian u32 capped well below anything a handshake legitimately
//! needs.

use crate::alert::AlertDescription;
use crate::engine::{CipherSuite, ProtocolVersion};
use crate::pin::PinBundle;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Magic bytes identifying a handshake frame.
pub const MAGIC: &[u8; 4] = b"TLSP";

/// Maximum frame payload (64 KiB).
pub const MAX_FRAME: u32 = 64 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("handshake i/o: {0}")]
    Io(#[from] io::Error),

    #[error("malformed handshake message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("handshake frame too large: {0} bytes (max: {MAX_FRAME})")]
    FrameTooLarge(u32),

    #[error("invalid handshake frame magic")]
    BadMagic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HandshakeMessage {
    ClientHello {
        versions: Vec<ProtocolVersion>,
        ciphers: Vec<CipherSuite>,
        srp_username: Option<String>,
        session_id: Option<String>,
        request_pinning: bool,
    },
    ServerHello {
        version: ProtocolVersion,
        cipher: CipherSuite,
        session_id: String,
        resumed: bool,
        /// Hex salt for the password proof; present only in password mode.
        srp_salt: Option<String>,
        /// Hex DER certificates, leaf first.
        cert_chain: Option<Vec<String>>,
        cert_request: bool,
        pinning: Option<PinBundle>,
    },
    ClientKeys {
        srp_proof: Option<String>,
        cert_chain: Option<Vec<String>>,
    },
    Finished {
        verify_data: String,
    },
    Alert {
        description: AlertDescription,
    },
}

impl HandshakeMessage {
    /// Short name used in "unexpected message" diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            HandshakeMessage::ClientHello { .. } => "ClientHello",
            HandshakeMessage::ServerHello { .. } => "ServerHello",
            HandshakeMessage::ClientKeys { .. } => "ClientKeys",
            HandshakeMessage::Finished { .. } => "Finished",
            HandshakeMessage::Alert { .. } => "Alert",
        }
    }
}

/// Write one frame; returns the payload bytes for transcript hashing.
pub async fn send<W>(writer: &mut W, message: &HandshakeMessage) -> Result<Vec<u8>, WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(message)?;
    if payload.len() as u32 > MAX_FRAME {
        return Err(WireError::FrameTooLarge(payload.len() as u32));
    }
    writer.write_all(MAGIC).await?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(payload)
}

/// Read one frame; returns the message and its payload bytes for
/// transcript hashing.
pub async fn recv<R>(reader: &mut R) -> Result<(HandshakeMessage, Vec<u8>), WireError>
where
    R: AsyncRead + Unpin,
{
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).await?;
    if &magic != MAGIC {
        return Err(WireError::BadMagic);
    }
    let len = reader.read_u32().await?;
    if len > MAX_FRAME {
        return Err(WireError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    let message = serde_json::from_slice(&payload)?;
    Ok((message, payload))
}
