//! socksd - SOCKS5 CONNECT proxy
//!
//! This is the main entry point for the socksd binary.

use anyhow::Result;
use clap::Parser;
use socksd::{ProxyConfig, ProxyServer};
use std::net::SocketAddr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// socksd - SOCKS5 CONNECT proxy with asynchronous DNS resolution
#[derive(Parser, Debug)]
#[command(name = "socksd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on (0 picks an ephemeral port)
    port: u16,

    /// Upstream nameserver as ip:port; defaults to the system resolver
    /// configuration
    #[arg(long)]
    resolver: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level)?;

    info!("socksd v{}", socksd::VERSION);

    let mut config = ProxyConfig::new(args.port);
    config.resolver = args.resolver;

    let server = ProxyServer::bind(&config).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down...");
            Ok(())
        }
    }
}

/// Setup logging from the command-line level
fn setup_logging(level: &str) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
