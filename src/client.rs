//! Test client: one connection, one handshake, one report.

use crate::alert::{classify, Classification, Outcome, Role};
use crate::config::CredentialSet;
use crate::engine::{self, EngineError};
use crate::report::SessionReport;
use anyhow::{anyhow, Context, Result};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

/// Bound on establishing the TCP connection. The handshake itself has no
/// timeout; the whole client is a single linear attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub credentials: CredentialSet,
    pub request_pinning: bool,
}

/// How the single attempt ended. Fatal failures never reach this type;
/// they propagate as errors.
#[derive(Debug)]
pub enum ClientStatus {
    Established(SessionReport),
    Rejected(Outcome),
}

/// Connect, perform exactly one handshake, report, and close. No retries:
/// failure is terminal for this single-shot client.
pub async fn run(config: ClientConfig) -> Result<ClientStatus> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Connecting to {addr}...");

    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| anyhow!("connection to {addr} timed out"))?
        .with_context(|| format!("failed to connect to {addr}"))?;
    debug!("TCP connection established");

    let start = Instant::now();
    let result =
        engine::client::handshake(&mut stream, &config.credentials, config.request_pinning, None)
            .await;
    let elapsed = start.elapsed();

    match result {
        Ok(session) => {
            let report = SessionReport::new(&session, Role::Client).with_handshake_time(elapsed);
            print!("{}", report.render());
            let _ = stream.shutdown().await;
            Ok(ClientStatus::Established(report))
        }
        Err(EngineError::Alert {
            alert,
            password_auth,
        }) => match classify(&alert, Role::Client, password_auth) {
            Classification::Classified(outcome) => {
                println!("{}", outcome.message(&alert));
                Ok(ClientStatus::Rejected(outcome))
            }
            // Unexpected for this mode: surface the original alert.
            Classification::Fatal => Err(anyhow::Error::new(alert)),
        },
        Err(e) => Err(e.into()),
    }
}
