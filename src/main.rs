use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tlsprobe::client::{self, ClientConfig, ClientStatus};
use tlsprobe::config::{
    load_break_signatures, load_cert_chain, load_pin, load_private_key, load_verifier_store,
    parse_address, resolve_client, resolve_server,
};
use tlsprobe::server::{Server, ServerConfig};

#[derive(Parser)]
#[command(name = "tlsprobe")]
#[command(about = "TLS handshake test client and server", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, perform one handshake, and report the session
    Client {
        /// PEM private key for certificate authentication
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// PEM certificate chain for certificate authentication
        #[arg(short, long)]
        cert: Option<PathBuf>,

        /// Username for password authentication
        #[arg(short, long)]
        user: Option<String>,

        /// Password for password authentication
        #[arg(short, long)]
        pass: Option<String>,

        /// Request the server's key pin during the handshake
        #[arg(long)]
        pinning: bool,

        /// Server address as HOST:PORT
        address: String,
    },
    /// Listen for handshakes and serve files over established sessions
    Server {
        /// PEM private key for the server certificate
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// PEM certificate chain presented to clients
        #[arg(short, long)]
        cert: Option<PathBuf>,

        /// JSON pin offered to clients that request pinning
        #[arg(short = 't', long)]
        pin: Option<PathBuf>,

        /// JSON pin break signatures offered alongside the pin
        #[arg(short = 'b', long = "break-sigs")]
        break_sigs: Option<PathBuf>,

        /// JSON password verifier store
        #[arg(short = 'v', long = "verifier-store")]
        verifier_store: Option<PathBuf>,

        /// Directory to serve after a successful handshake
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Require certificate-mode clients to present a certificate
        #[arg(long)]
        reqcert: bool,

        /// Listen address as HOST:PORT
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Client {
            key,
            cert,
            user,
            pass,
            pinning,
            address,
        } => {
            let (host, port) = parse_address(&address)?;
            let key = key.as_deref().map(load_private_key).transpose()?;
            let chain = cert.as_deref().map(load_cert_chain).transpose()?;
            let credentials = resolve_client(key, chain, user, pass)?;

            let status = client::run(ClientConfig {
                host,
                port,
                credentials,
                request_pinning: pinning,
            })
            .await?;
            if let ClientStatus::Rejected(_) = status {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Server {
            key,
            cert,
            pin,
            break_sigs,
            verifier_store,
            dir,
            reqcert,
            address,
        } => {
            let (host, port) = parse_address(&address)?;
            let key = key.as_deref().map(load_private_key).transpose()?;
            let chain = cert.as_deref().map(load_cert_chain).transpose()?;
            let pin = pin.as_deref().map(load_pin).transpose()?;
            let break_signatures = break_sigs
                .as_deref()
                .map(load_break_signatures)
                .transpose()?
                .unwrap_or_default();
            let verifiers = verifier_store.as_deref().map(load_verifier_store).transpose()?;
            let policy = resolve_server(key, chain, pin, break_signatures, verifiers, reqcert)?;

            let server = Server::new(ServerConfig {
                host,
                port,
                policy,
                serve_root: dir,
            });
            server.run().await
        }
    }
}
