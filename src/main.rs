//! Session Proxy
//!
//! A reverse proxy whose routes are provisioned by a session orchestrator.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────┐
//!  Orchestrator       │                 SESSION PROXY                 │
//!  ───── WebSocket ───┼─▶ control ──▶ routing store (ArcSwap)         │
//!        ◀── report ──┼──   client          │                         │
//!                     │                     ▼ snapshot                │
//!  Client Request ────┼─▶ http server ──▶ resolve ──▶ hyper client ───┼──▶ Backend
//!  Client Response ◀──┼── location rewrite ◀──────────────────────────┼─── Backend
//!                     │                                               │
//!                     │  config · lifecycle · observability · resilience
//!                     └───────────────────────────────────────────────┘
//! ```

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use session_proxy::config::{load_config, ProxyConfig};
use session_proxy::lifecycle;
use session_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "session-proxy")]
#[command(about = "Reverse proxy with orchestrator-provisioned session routes", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "session-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        control_channel = %config.control_channel.url,
        default_backend = %config.routing.default_backend,
        content_token_header = %config.routing.content_token_header,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    lifecycle::run(config).await?;
    Ok(())
}
