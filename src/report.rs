//! Session report formatting.
//!
//! Pure `Session` → text. The line layout is part of the observable
//! contract, so rendering is deterministic: fixed order, conditional lines
//! only for state that was actually negotiated.

use crate::alert::Role;
use crate::engine::{Session, CIPHER_IMPLEMENTATION};
use crate::pin;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub version: String,
    pub cipher: String,
    pub resumed: bool,
    pub srp_username: Option<String>,
    pub client_cert_fingerprint: Option<String>,
    pub server_cert_fingerprint: Option<String>,
    pub pinning_text: Option<String>,
    pub handshake_time: Option<Duration>,
}

impl SessionReport {
    pub fn new(session: &Session, role: Role) -> Self {
        let pinning_text = session
            .pinning
            .as_ref()
            .map(|bundle| pin::format_text(bundle, role == Role::Server));
        SessionReport {
            version: session.version.to_string(),
            cipher: format!("{} {}", session.cipher, CIPHER_IMPLEMENTATION),
            resumed: session.resumed,
            srp_username: session.srp_username.clone(),
            client_cert_fingerprint: session.client_cert_fingerprint.clone(),
            server_cert_fingerprint: session.server_cert_fingerprint.clone(),
            pinning_text,
            handshake_time: None,
        }
    }

    pub fn with_handshake_time(mut self, elapsed: Duration) -> Self {
        self.handshake_time = Some(elapsed);
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Handshake success\n");
        if let Some(elapsed) = self.handshake_time {
            out.push_str(&format!(
                "  Handshake time: {:.4} seconds\n",
                elapsed.as_secs_f64()
            ));
        }
        out.push_str(&format!("  Version: {}\n", self.version));
        out.push_str(&format!("  Cipher: {}\n", self.cipher));
        if self.resumed {
            out.push_str("  Session: resumed\n");
        }
        if let Some(username) = &self.srp_username {
            out.push_str(&format!("  Client SRP username: {username}\n"));
        }
        if let Some(fp) = &self.client_cert_fingerprint {
            out.push_str(&format!("  Client certificate SHA-256 fingerprint: {fp}\n"));
        }
        if let Some(fp) = &self.server_cert_fingerprint {
            out.push_str(&format!("  Server certificate SHA-256 fingerprint: {fp}\n"));
        }
        if let Some(text) = &self.pinning_text {
            out.push_str("  Pinning:\n");
            for line in text.lines() {
                out.push_str(&format!("    {line}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CipherSuite, ProtocolVersion};
    use crate::pin::{BreakSignature, Pin, PinBundle};

    fn session() -> Session {
        Session {
            version: ProtocolVersion::Tls13,
            cipher: CipherSuite::Aes128GcmSha256,
            srp_username: None,
            client_cert_fingerprint: None,
            server_cert_fingerprint: None,
            pinning: None,
            resumption_id: Some("ab".into()),
            resumed: false,
        }
    }

    #[test]
    fn minimal_report() {
        let report = SessionReport::new(&session(), Role::Client);
        assert_eq!(
            report.render(),
            "Handshake success\n  Version: TLSv1.3\n  Cipher: TLS_AES_128_GCM_SHA256 pure-rust\n"
        );
    }

    #[test]
    fn full_report_line_order() {
        let mut s = session();
        s.srp_username = Some("alice".into());
        s.server_cert_fingerprint = Some("00ff".into());
        s.pinning = Some(PinBundle {
            pin: Pin {
                key_fingerprint: "ab".into(),
                generation: 1,
                expiration: 2,
            },
            break_signatures: vec![BreakSignature {
                key_fingerprint: "cd".into(),
                signature: "ef".into(),
            }],
        });
        let report = SessionReport::new(&s, Role::Client)
            .with_handshake_time(Duration::from_millis(1234));
        let text = report.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Handshake success");
        assert_eq!(lines[1], "  Handshake time: 1.2340 seconds");
        assert_eq!(lines[2], "  Version: TLSv1.3");
        assert_eq!(lines[3], "  Cipher: TLS_AES_128_GCM_SHA256 pure-rust");
        assert_eq!(lines[4], "  Client SRP username: alice");
        assert_eq!(lines[5], "  Server certificate SHA-256 fingerprint: 00ff");
        assert_eq!(lines[6], "  Pinning:");
        assert!(lines[7].starts_with("    pin (received):"));
        assert!(lines[8].starts_with("    break signature:"));
    }

    #[test]
    fn resumed_marker() {
        let mut s = session();
        s.resumed = true;
        let text = SessionReport::new(&s, Role::Server).render();
        assert!(text.contains("  Session: resumed\n"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let report = SessionReport::new(&session(), Role::Server);
        assert_eq!(report.render(), report.render());
    }
}
