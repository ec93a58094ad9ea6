//! Persistent connection to the session orchestrator.
//!
//! # State Machine
//! ```text
//! Disconnected → Connecting → Connected
//!                    ▲            │
//!                    └── lost ────┘   (delay from ReconnectPolicy, forever)
//! ```
//!
//! # Design Decisions
//! - One background task per client; construction never blocks on the network
//! - Connection failures are logged and retried, never returned to the caller
//! - A failing or panicking handler drops that one event, not the subscription
//! - Shutdown is explicit (`shutdown().await`); dropping only cancels the task
//! - `stop_events()` stops processing while keeping the connection open, so
//!   the owner can drain traffic before closing it

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ControlChannelConfig;
use crate::control::handler::{HandlerError, HandlerOutcome, SessionHandler};
use crate::control::messages::{InboundMessage, OutboundMessage};
use crate::observability::metrics;
use crate::resilience::{ReconnectPolicy, RetryContext};
use crate::routing::Snapshot;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state of the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection-level failures. All of them lead to a reconnect.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("connect failed: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[source] tungstenite::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a connected session ended.
enum SessionEnd {
    Cancelled,
    Lost(String),
}

/// Handle to the background control channel task.
pub struct ControlChannelClient {
    state: watch::Receiver<ChannelState>,
    cancel: CancellationToken,
    events: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ControlChannelClient {
    /// Spawn the connection loop. Must be called inside a Tokio runtime.
    pub fn start(
        config: &ControlChannelConfig,
        handler: SessionHandler,
        policy: Arc<dyn ReconnectPolicy>,
    ) -> Self {
        let (state_tx, state) = watch::channel(ChannelState::Disconnected);
        let cancel = CancellationToken::new();
        let events = cancel.child_token();

        let worker = Worker {
            url: config.url.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            handler,
            policy,
            state_tx,
            cancel: cancel.clone(),
            events: events.clone(),
        };
        let task = tokio::spawn(worker.run());

        tracing::info!(url = %config.url, "Control channel client started");

        Self {
            state,
            cancel,
            events,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Stop applying events and stop reconnecting. An open connection stays
    /// open until `shutdown`.
    pub fn stop_events(&self) {
        self.events.cancel();
    }

    /// Stop processing events, close the connection and wait for the task.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Control channel task ended abnormally");
            }
        }
        tracing::info!("Control channel client stopped");
    }
}

impl Drop for ControlChannelClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    url: String,
    connect_timeout: Duration,
    handler: SessionHandler,
    policy: Arc<dyn ReconnectPolicy>,
    state_tx: watch::Sender<ChannelState>,
    cancel: CancellationToken,
    /// Child of `cancel`; also fired alone by `stop_events`.
    events: CancellationToken,
}

impl Worker {
    async fn run(self) {
        let mut attempt: u32 = 0;
        let mut since = Instant::now();

        loop {
            self.set_state(ChannelState::Connecting);

            let connected = tokio::select! {
                _ = self.events.cancelled() => break,
                res = self.connect() => res,
            };

            match connected {
                Ok(ws) => {
                    attempt = 0;
                    let connection_id = Uuid::new_v4().to_string();
                    self.set_state(ChannelState::Connected);
                    tracing::info!(
                        url = %self.url,
                        connection_id = %connection_id,
                        "Control channel connected"
                    );

                    match self.serve(ws, &connection_id).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Lost(reason) => {
                            tracing::warn!(
                                connection_id = %connection_id,
                                reason = %reason,
                                "Control channel connection lost"
                            );
                        }
                    }
                    self.set_state(ChannelState::Connecting);
                    since = Instant::now();
                }
                Err(e) => {
                    tracing::warn!(
                        url = %self.url,
                        attempt = attempt + 1,
                        error = %e,
                        "Control channel connect failed"
                    );
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.policy.next_delay(&RetryContext {
                attempt,
                elapsed: since.elapsed(),
            });
            metrics::record_reconnect();
            tracing::info!(attempt, delay = ?delay, "Reconnecting to control channel");

            tokio::select! {
                _ = self.events.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ChannelState::Disconnected);
    }

    async fn connect(&self) -> Result<WsStream, ControlError> {
        let connect = connect_async(self.url.as_str());
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(e)) => Err(ControlError::Connect(e)),
            Err(_) => Err(ControlError::Timeout(self.connect_timeout)),
        }
    }

    async fn serve(&self, ws: WsStream, connection_id: &str) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();

        loop {
            let frame = tokio::select! {
                _ = self.events.cancelled() => {
                    self.cancel.cancelled().await;
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Close frame not delivered");
                    }
                    return SessionEnd::Cancelled;
                }
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    self.dispatch(text.as_bytes(), &mut sink, connection_id).await
                }
                Some(Ok(Message::Binary(data))) => {
                    self.dispatch(&data, &mut sink, connection_id).await
                }
                Some(Ok(Message::Close(frame))) => {
                    return SessionEnd::Lost(format!("closed by orchestrator: {frame:?}"));
                }
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                None => return SessionEnd::Lost("stream ended".to_string()),
            }
        }
    }

    async fn dispatch<S>(&self, payload: &[u8], sink: &mut S, connection_id: &str)
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let message: InboundMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed control message");
                metrics::record_session_event("unknown", "malformed");
                return;
            }
        };
        let kind = message.kind();

        let Some(outcome) = run_guarded(kind, || self.handler.handle(message)) else {
            return;
        };

        if let Some(snapshot) = outcome.report() {
            if let Err(e) = send_report(sink, connection_id, snapshot).await {
                tracing::warn!(kind, error = %e, "Failed to send configuration report");
            }
        }
    }

    fn set_state(&self, state: ChannelState) {
        self.state_tx.send_replace(state);
        metrics::record_channel_state(state);
    }
}

/// Run one handler invocation. Errors and panics are logged and yield `None`.
fn run_guarded<F>(kind: &'static str, handle: F) -> Option<HandlerOutcome>
where
    F: FnOnce() -> Result<HandlerOutcome, HandlerError>,
{
    match catch_unwind(AssertUnwindSafe(handle)) {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(e)) => {
            tracing::error!(kind, error = %e, "Session event handler failed");
            None
        }
        Err(_) => {
            tracing::error!(kind, "Session event handler panicked");
            None
        }
    }
}

async fn send_report<S>(
    sink: &mut S,
    connection_id: &str,
    snapshot: &Snapshot,
) -> Result<(), ControlError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let report = OutboundMessage::ProxyConfigurationReport {
        connection_id,
        snapshot,
    };
    let json = serde_json::to_string(&report)?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(ControlError::Transport)
}
