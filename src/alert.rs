//! Alert taxonomy and failure classification.
//!
//! A handshake that does not complete ends in an [`Alert`]: a reason code
//! plus which side raised it. Classification turns the small set of
//! *expected* alerts into user-facing outcomes. Everything else is a
//! defect signal and must propagate unchanged, since silently absorbing
//! an unmatched alert would hide real negotiation bugs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Alert reason codes, numbered as TLS numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertDescription {
    CloseNotify,
    UnexpectedMessage,
    BadRecordMac,
    HandshakeFailure,
    BadCertificate,
    CertificateUnknown,
    IllegalParameter,
    InternalError,
    UserCanceled,
    UnknownPskIdentity,
}

impl AlertDescription {
    pub fn code(&self) -> u8 {
        match self {
            AlertDescription::CloseNotify => 0,
            AlertDescription::UnexpectedMessage => 10,
            AlertDescription::BadRecordMac => 20,
            AlertDescription::HandshakeFailure => 40,
            AlertDescription::BadCertificate => 42,
            AlertDescription::CertificateUnknown => 46,
            AlertDescription::IllegalParameter => 47,
            AlertDescription::InternalError => 80,
            AlertDescription::UserCanceled => 90,
            AlertDescription::UnknownPskIdentity => 115,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlertDescription::CloseNotify => "close_notify",
            AlertDescription::UnexpectedMessage => "unexpected_message",
            AlertDescription::BadRecordMac => "bad_record_mac",
            AlertDescription::HandshakeFailure => "handshake_failure",
            AlertDescription::BadCertificate => "bad_certificate",
            AlertDescription::CertificateUnknown => "certificate_unknown",
            AlertDescription::IllegalParameter => "illegal_parameter",
            AlertDescription::InternalError => "internal_error",
            AlertDescription::UserCanceled => "user_canceled",
            AlertDescription::UnknownPskIdentity => "unknown_psk_identity",
        }
    }
}

impl fmt::Display for AlertDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Which side raised the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOrigin {
    /// Raised by this side (sent to the peer).
    Local,
    /// Received from the peer.
    Remote,
}

impl fmt::Display for AlertOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertOrigin::Local => write!(f, "local"),
            AlertOrigin::Remote => write!(f, "remote"),
        }
    }
}

/// A handshake failure signal. Transient: carried out of the handshake
/// call, classified once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{origin} alert: {description}")]
pub struct Alert {
    pub origin: AlertOrigin,
    pub description: AlertDescription,
}

impl Alert {
    pub fn local(description: AlertDescription) -> Self {
        Alert {
            origin: AlertOrigin::Local,
            description,
        }
    }

    pub fn remote(description: AlertDescription) -> Self {
        Alert {
            origin: AlertOrigin::Remote,
            description,
        }
    }
}

/// The endpoint whose handshake outcome is being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// User-facing outcome of a classified handshake failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Canceled,
    BadCredentials(&'static str),
    NegotiationFailed,
}

impl Outcome {
    /// Diagnostic line printed for this outcome. Cancellation passes the
    /// alert text through; the others have fixed wording.
    pub fn message(&self, alert: &Alert) -> String {
        match self {
            Outcome::Canceled => alert.to_string(),
            Outcome::BadCredentials(msg) => (*msg).to_string(),
            Outcome::NegotiationFailed => {
                "Unable to negotiate mutually acceptable parameters".to_string()
            }
        }
    }
}

/// Result of running an alert through the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Expected failure: report the outcome and stop (client) or reject
    /// the connection (server).
    Classified(Outcome),
    /// Unexpected for the current mode: re-raise unchanged.
    Fatal,
}

/// Classify a handshake alert. First match wins.
///
/// The cancellation alert originates at the client (Local there, Remote on
/// the server); the rejection codes originate at the side refusing the
/// attempt (Remote as seen by the client, Local as raised by the server).
/// `password_auth` must reflect whether *this* handshake attempt used
/// password authentication: the same wire code means something different
/// under certificate auth, and in that case it re-raises.
pub fn classify(alert: &Alert, role: Role, password_auth: bool) -> Classification {
    use AlertDescription::*;
    use AlertOrigin::*;

    let (canceled_origin, rejected_origin) = match role {
        Role::Client => (Local, Remote),
        Role::Server => (Remote, Local),
    };

    match (alert.origin, alert.description) {
        (o, UserCanceled) if o == canceled_origin => Classification::Classified(Outcome::Canceled),
        (o, UnknownPskIdentity) if o == rejected_origin && password_auth => {
            Classification::Classified(Outcome::BadCredentials("Unknown username"))
        }
        (o, BadRecordMac) if o == rejected_origin && password_auth => {
            Classification::Classified(Outcome::BadCredentials("Bad username or password"))
        }
        (o, HandshakeFailure) if o == rejected_origin => {
            Classification::Classified(Outcome::NegotiationFailed)
        }
        _ => Classification::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AlertDescription::*;

    fn classified(alert: &Alert, role: Role, password_auth: bool) -> Option<Outcome> {
        match classify(alert, role, password_auth) {
            Classification::Classified(o) => Some(o),
            Classification::Fatal => None,
        }
    }

    #[test]
    fn client_cancel_is_classified() {
        let alert = Alert::local(UserCanceled);
        assert_eq!(
            classified(&alert, Role::Client, false),
            Some(Outcome::Canceled)
        );
        // A cancel the *peer* sends to a client is not the client's own
        // cancellation; it re-raises.
        assert_eq!(classified(&Alert::remote(UserCanceled), Role::Client, false), None);
    }

    #[test]
    fn server_sees_cancel_from_peer() {
        assert_eq!(
            classified(&Alert::remote(UserCanceled), Role::Server, false),
            Some(Outcome::Canceled)
        );
        assert_eq!(classified(&Alert::local(UserCanceled), Role::Server, false), None);
    }

    #[test]
    fn unknown_username_gated_on_password_auth() {
        let alert = Alert::remote(UnknownPskIdentity);
        assert_eq!(
            classified(&alert, Role::Client, true),
            Some(Outcome::BadCredentials("Unknown username"))
        );
        // Certificate-mode client receiving this alert is a protocol bug,
        // not a credential problem.
        assert_eq!(classified(&alert, Role::Client, false), None);
    }

    #[test]
    fn bad_record_mac_gated_on_password_auth() {
        let alert = Alert::remote(BadRecordMac);
        assert_eq!(
            classified(&alert, Role::Client, true),
            Some(Outcome::BadCredentials("Bad username or password"))
        );
        assert_eq!(classified(&alert, Role::Client, false), None);
    }

    #[test]
    fn server_classifies_its_own_rejections() {
        assert_eq!(
            classified(&Alert::local(UnknownPskIdentity), Role::Server, true),
            Some(Outcome::BadCredentials("Unknown username"))
        );
        assert_eq!(
            classified(&Alert::local(BadRecordMac), Role::Server, true),
            Some(Outcome::BadCredentials("Bad username or password"))
        );
        // Same codes received from the peer re-raise.
        assert_eq!(classified(&Alert::remote(BadRecordMac), Role::Server, true), None);
    }

    #[test]
    fn handshake_failure_classified_in_any_mode() {
        let alert = Alert::remote(HandshakeFailure);
        assert_eq!(
            classified(&alert, Role::Client, true),
            Some(Outcome::NegotiationFailed)
        );
        assert_eq!(
            classified(&alert, Role::Client, false),
            Some(Outcome::NegotiationFailed)
        );
        assert_eq!(
            classified(&Alert::local(HandshakeFailure), Role::Server, false),
            Some(Outcome::NegotiationFailed)
        );
    }

    #[test]
    fn everything_else_is_fatal() {
        for desc in [
            CloseNotify,
            UnexpectedMessage,
            BadCertificate,
            CertificateUnknown,
            IllegalParameter,
            InternalError,
        ] {
            assert_eq!(classified(&Alert::remote(desc), Role::Client, true), None);
            assert_eq!(classified(&Alert::local(desc), Role::Server, true), None);
        }
    }

    #[test]
    fn outcome_messages() {
        let cancel = Alert::local(UserCanceled);
        assert_eq!(
            Outcome::Canceled.message(&cancel),
            "local alert: user_canceled (90)"
        );
        assert_eq!(
            Outcome::NegotiationFailed.message(&Alert::remote(HandshakeFailure)),
            "Unable to negotiate mutually acceptable parameters"
        );
    }

    #[test]
    fn codes_match_tls_registry() {
        assert_eq!(BadRecordMac.code(), 20);
        assert_eq!(HandshakeFailure.code(), 40);
        assert_eq!(UserCanceled.code(), 90);
        assert_eq!(UnknownPskIdentity.code(), 115);
    }
}
