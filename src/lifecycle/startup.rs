//! Startup orchestration.
//!
//! # Order
//! ```text
//! start:    store (catch-all) → control channel client → HTTP listener
//! shutdown: stop events + listener → drain in-flight requests (bounded) → close channel
//! ```
//!
//! # Design Decisions
//! - The store exists before anything can read or write it, so the proxy
//!   serves the catch-all route from its first request
//! - The control channel never blocks startup; it connects in the background

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ProxyConfig;
use crate::control::{ChannelState, ControlChannelClient, SessionHandler};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::{drain_task, Shutdown};
use crate::lifecycle::signals::wait_for_shutdown_signal;
use crate::resilience::policy_from_config;
use crate::routing::ConfigurationStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid default backend address: {0}")]
    DefaultBackend(#[from] url::ParseError),

    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// A started proxy: store, control channel and HTTP listener.
pub struct RunningProxy {
    store: Arc<ConfigurationStore>,
    control: ControlChannelClient,
    server: JoinHandle<Result<(), std::io::Error>>,
    shutdown: Shutdown,
    local_addr: SocketAddr,
    drain_window: Duration,
}

impl RunningProxy {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &Arc<ConfigurationStore> {
        &self.store
    }

    pub fn channel_state(&self) -> ChannelState {
        self.control.state()
    }

    /// Stop taking control events and new requests, drain within the
    /// configured window, then close the control channel.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down");
        self.control.stop_events();
        self.shutdown.trigger();

        match drain_task(self.server, self.drain_window).await {
            Some(Ok(Ok(()))) => {}
            Some(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server failed during shutdown"),
            Some(Err(e)) => tracing::error!(error = %e, "HTTP server task ended abnormally"),
            None => tracing::warn!("HTTP server aborted after the drain window"),
        }

        self.control.shutdown().await;
        tracing::info!("Shutdown complete");
    }
}

/// Initialize every subsystem and start serving.
pub async fn start(config: ProxyConfig) -> Result<RunningProxy, StartupError> {
    let store = Arc::new(ConfigurationStore::from_config(&config.routing)?);

    let handler = SessionHandler::new(store.clone(), &config.routing);
    let policy = policy_from_config(&config.control_channel.reconnect);
    let control = ControlChannelClient::start(&config.control_channel, handler, policy);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, store.clone());
    let server = tokio::spawn(server.run(listener, shutdown.subscribe()));

    Ok(RunningProxy {
        store,
        control,
        server,
        shutdown,
        local_addr,
        drain_window: Duration::from_secs(config.timeouts.shutdown_drain_secs),
    })
}

/// Run until SIGINT/SIGTERM, then shut down gracefully.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let proxy = start(config).await?;
    wait_for_shutdown_signal().await;
    proxy.shutdown().await;
    Ok(())
}
