//! Pinning structures exchanged during the handshake.
//!
//! The pinning format itself is an external concern; this module keeps it
//! as an opaque-but-loadable JSON document and renders the text block that
//! appears in session reports.

use serde::{Deserialize, Serialize};

/// A key-continuity pin offered by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    /// Hex fingerprint of the pinned key.
    pub key_fingerprint: String,
    pub generation: u32,
    /// Expiration as a unix timestamp.
    pub expiration: u64,
}

/// A signature breaking a previously published pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakSignature {
    pub key_fingerprint: String,
    pub signature: String,
}

/// Pin plus break signatures, as carried in the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinBundle {
    pub pin: Pin,
    pub break_signatures: Vec<BreakSignature>,
}

/// Render a pinning bundle for the session report. Servers label the pin
/// as offered, clients as received.
pub fn format_text(bundle: &PinBundle, is_server: bool) -> String {
    let label = if is_server { "offered" } else { "received" };
    let mut out = format!(
        "pin ({}): fingerprint={} generation={} expires={}\n",
        label, bundle.pin.key_fingerprint, bundle.pin.generation, bundle.pin.expiration
    );
    for sig in &bundle.break_signatures {
        out.push_str(&format!(
            "break signature: fingerprint={} signature={}\n",
            sig.key_fingerprint, sig.signature
        ));
    }
    out
}
