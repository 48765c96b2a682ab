//! Test server: concurrent listener, per-connection handshake dispatch,
//! and a minimal file-serving payload after a successful handshake.
//!
//! Each accepted connection runs in its own task with its own failure
//! domain: a classified handshake failure rejects just that connection, a
//! fatal one is logged by the accept loop and never disturbs the listener
//! or sibling connections. Tasks share only the injected session cache.

use crate::alert::{classify, Classification, Role};
use crate::cache::SessionCache;
use crate::config::ServerPolicy;
use crate::engine::{self, EngineError};
use crate::report::SessionReport;
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Admission cap on concurrent connections. A bounded task model instead
/// of the traditional unbounded thread-per-connection; connections beyond
/// the cap are dropped at accept time.
pub const MAX_CONNECTIONS: usize = 100;

/// Largest request head we will buffer before answering 400.
const MAX_REQUEST_HEAD: usize = 8 * 1024;

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub policy: ServerPolicy,
    /// Directory served after a successful handshake.
    pub serve_root: PathBuf,
}

pub struct Server {
    policy: Arc<ServerPolicy>,
    cache: Arc<SessionCache>,
    permits: Arc<Semaphore>,
    bind_addr: String,
    serve_root: PathBuf,
}

impl Server {
    /// One cache per server lifetime, created here and handed to every
    /// connection task.
    pub fn new(config: ServerConfig) -> Self {
        Server {
            bind_addr: format!("{}:{}", config.host, config.port),
            policy: Arc::new(config.policy),
            cache: Arc::new(SessionCache::new()),
            permits: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
            serve_root: config.serve_root,
        }
    }

    /// Bind and serve until the process is killed.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .with_context(|| format!("failed to bind to {}", self.bind_addr))?;
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener (separated so tests can
    /// bind an ephemeral port themselves).
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("listener has no address")?;
        info!("I am a TLS test server, I will listen on {local}");
        info!("Serving files from {}", self.serve_root.display());
        if self.policy.identity.is_some() {
            info!("Using certificate and private key...");
        }
        if self.policy.verifiers.is_some() {
            info!("Using verifier store...");
        }
        if self.policy.pin.is_some() {
            info!("Using pin...");
        }
        if !self.policy.break_signatures.is_empty() {
            info!("Using pin break signatures...");
        }

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("failed to accept connection: {e}");
                    continue;
                }
            };

            let permit = match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("connection limit reached, rejecting {peer}");
                    continue;
                }
            };

            let policy = Arc::clone(&self.policy);
            let cache = Arc::clone(&self.cache);
            let serve_root = self.serve_root.clone();

            tokio::spawn(async move {
                let _permit = permit;
                match handle_connection(stream, peer, &policy, &cache, &serve_root).await {
                    Ok(true) => debug!("connection from {peer} served"),
                    Ok(false) => debug!("connection from {peer} rejected"),
                    Err(e) => error!("connection from {peer} failed: {e:#}"),
                }
            });
        }
    }
}

/// Handshake one accepted connection and, on success, serve one request.
/// Returns whether the connection was accepted for traffic.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    policy: &ServerPolicy,
    cache: &SessionCache,
    serve_root: &Path,
) -> Result<bool> {
    debug!("about to handshake with {peer}");
    match engine::server::handshake(&mut stream, policy, cache).await {
        Ok(session) => {
            let report = SessionReport::new(&session, Role::Server);
            print!("{}", report.render());
            // Past this point an abrupt peer close is benign, not an error.
            match serve_request(&mut stream, serve_root).await {
                Ok(()) => {}
                Err(e) if is_abrupt_close(&e) => debug!("peer {peer} closed abruptly"),
                Err(e) => return Err(e).context("serving request"),
            }
            Ok(true)
        }
        Err(EngineError::Alert {
            alert,
            password_auth,
        }) => match classify(&alert, Role::Server, password_auth) {
            Classification::Classified(outcome) => {
                println!("{}", outcome.message(&alert));
                Ok(false)
            }
            Classification::Fatal => Err(anyhow::Error::new(alert)),
        },
        Err(e) => Err(e.into()),
    }
}

fn is_abrupt_close(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
    )
}

/// Serve a single `GET` over the established connection. The file payload
/// is a carrier for post-handshake traffic, nothing more: one request,
/// minimal HTTP/1.0 response, connection closed.
async fn serve_request(stream: &mut TcpStream, serve_root: &Path) -> io::Result<()> {
    let head = read_request_head(stream).await?;
    let response = match parse_get_path(&head).and_then(sanitize_path) {
        Some(path) => match tokio::fs::read(serve_root.join(&path)).await {
            Ok(body) => http_response("200 OK", &body),
            Err(_) => http_response("404 Not Found", b"not found\n"),
        },
        None => http_response("400 Bad Request", b"bad request\n"),
    };
    stream.write_all(&response).await?;
    stream.shutdown().await
}

async fn read_request_head(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") && head.len() < MAX_REQUEST_HEAD {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        head.push(byte[0]);
    }
    Ok(head)
}

fn parse_get_path(head: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(head).ok()?;
    let request_line = text.lines().next()?;
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    Some(target.to_string())
}

/// Refuse anything that could escape the serving root. Only the single
/// leading slash of the request target is stripped, so a doubled slash
/// still trips the guards below.
fn sanitize_path(target: String) -> Option<String> {
    let path = target.strip_prefix('/').unwrap_or(&target);
    if path.is_empty()
        || path.contains("..")
        || path.contains('\\')
        || path.starts_with('/')
        || path.contains("//")
    {
        return None;
    }
    Some(path.to_string())
}

fn http_response(status: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.0 {status}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}
