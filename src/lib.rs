//! TLS handshake test driver.
//!
//! A client that performs exactly one handshake and reports the
//! negotiated session, and a server that accepts concurrent connections,
//! classifies handshake failures, and serves files over established
//! sessions. Built for exercising credential handling: certificate and
//! password authentication, key pinning, and session resumption.

pub mod alert;
pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
pub mod pin;
pub mod report;
pub mod server;
pub mod verifier;

pub use alert::{classify, Alert, AlertDescription, AlertOrigin, Classification, Outcome, Role};
pub use cache::{CachedSession, SessionCache, SessionId};
pub use client::{ClientConfig, ClientStatus};
pub use config::{ConfigError, CredentialSet, ServerIdentity, ServerPolicy};
pub use engine::{CipherSuite, EngineError, ProtocolVersion, Session};
pub use pin::{BreakSignature, Pin, PinBundle};
pub use report::SessionReport;
pub use server::{Server, ServerConfig};
pub use verifier::VerifierStore;
