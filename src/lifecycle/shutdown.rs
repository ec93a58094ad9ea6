//! Shutdown coordination for the proxy.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for `task` at most `window`. Returns `None` if the window elapsed first.
pub async fn drain<F: Future>(task: F, window: Duration) -> Option<F::Output> {
    match tokio::time::timeout(window, task).await {
        Ok(output) => Some(output),
        Err(_) => {
            tracing::warn!(window = ?window, "Drain window elapsed, abandoning in-flight work");
            None
        }
    }
}

/// Wait for a spawned task at most `window`, aborting it if the window
/// elapses. The task has stopped when this returns.
pub async fn drain_task<T>(
    mut task: JoinHandle<T>,
    window: Duration,
) -> Option<Result<T, JoinError>> {
    match drain(&mut task, window).await {
        Some(result) => Some(result),
        None => {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Task failed while being aborted");
                }
            }
            None
        }
    }
}
