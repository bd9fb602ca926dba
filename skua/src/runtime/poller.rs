use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

use super::dispatcher::Dispatcher;
use crate::queue::QueueConsumer;
use crate::submit::ComputeScheduler;

/// Configuration for the polling loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Backoff in milliseconds after an empty receive.
    pub idle_backoff_ms: u64,
    /// Backoff in milliseconds after a receive error.
    pub error_backoff_ms: u64,
    /// How long shutdown waits for in-flight pollers, in seconds.
    pub shutdown_grace_secs: u64,
}

impl PollerConfig {
    /// Set the idle backoff.
    pub fn with_idle_backoff(mut self, ms: u64) -> Self {
        self.idle_backoff_ms = ms;
        self
    }

    /// Set the error backoff.
    pub fn with_error_backoff(mut self, ms: u64) -> Self {
        self.error_backoff_ms = ms;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_grace(mut self, secs: u64) -> Self {
        self.shutdown_grace_secs = secs;
        self
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            idle_backoff_ms: 500,
            error_backoff_ms: 1000,
            shutdown_grace_secs: 30,
        }
    }
}

/// Token for signaling graceful shutdown to pollers.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    /// Create a new shutdown token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation to all clones of this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Always-on polling runtime around a [`Dispatcher`].
///
/// Spawns stateless poller tasks that loop receive → dispatch. Pollers
/// share no mutable state beyond the queue itself, so parallelism scales
/// batch throughput without coordination. Termination is externally driven:
/// cancel the shutdown token and any record not yet acknowledged stays
/// eligible for redelivery, which keeps partial-batch interruption safe.
pub struct DispatchRuntime<Q, S>
where
    Q: QueueConsumer + 'static,
    S: ComputeScheduler + 'static,
{
    dispatcher: Arc<Dispatcher<Q, S>>,
    config: PollerConfig,
    shutdown_token: ShutdownToken,
    poller_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl<Q, S> DispatchRuntime<Q, S>
where
    Q: QueueConsumer + 'static,
    S: ComputeScheduler + 'static,
{
    /// Create a runtime around the given dispatcher.
    pub fn new(dispatcher: Arc<Dispatcher<Q, S>>, config: PollerConfig) -> Self {
        Self {
            dispatcher,
            config,
            shutdown_token: ShutdownToken::new(),
            poller_handles: Mutex::new(Vec::new()),
        }
    }

    /// Get a clone of the dispatcher.
    pub fn dispatcher(&self) -> Arc<Dispatcher<Q, S>> {
        Arc::clone(&self.dispatcher)
    }

    /// Get a clone of the shutdown token.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown_token.clone()
    }

    /// Spawn a pool of poller tasks.
    pub async fn spawn_pollers(&self, parallelism: usize) {
        for i in 0..parallelism {
            let poller_id = format!("poller-{}-{}", std::process::id(), i);
            let dispatcher = Arc::clone(&self.dispatcher);
            let config = self.config.clone();
            let shutdown = self.shutdown_token.clone();

            let handle = tokio::spawn(async move {
                Self::poll_loop(poller_id, dispatcher, config, shutdown).await;
            });
            self.poller_handles.lock().await.push(handle);
        }
    }

    /// Gracefully shut down all pollers.
    ///
    /// In-flight records finish dispatching; pollers that exceed the grace
    /// period are abandoned with a warning.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        tracing::info!("initiating dispatch runtime shutdown");
        self.shutdown_token.cancel();

        let handles = {
            let mut guard = self.poller_handles.lock().await;
            std::mem::take(&mut *guard)
        };

        let grace =
            tokio::time::Duration::from_secs(self.config.shutdown_grace_secs);
        for handle in handles {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("poller task failed: {:?}", e),
                Err(_) => {
                    tracing::warn!("poller task timed out during shutdown")
                }
            }
        }

        tracing::info!("dispatch runtime shutdown complete");
        Ok(())
    }

    async fn poll_loop(
        poller_id: String,
        dispatcher: Arc<Dispatcher<Q, S>>,
        config: PollerConfig,
        shutdown: ShutdownToken,
    ) {
        let queue = dispatcher.queue();

        loop {
            if shutdown.is_cancelled() {
                tracing::info!(poller_id = %poller_id, "poller shutting down");
                break;
            }

            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = queue.receive_batch() => received,
            };

            match received {
                Ok(records) if records.is_empty() => {
                    Self::pause(&shutdown, config.idle_backoff_ms).await;
                }
                Ok(records) => {
                    dispatcher.dispatch_batch(records).await;
                }
                Err(err) => {
                    tracing::warn!(
                        poller_id = %poller_id,
                        error = %format!("{:#}", err),
                        "receive_batch failed"
                    );
                    Self::pause(&shutdown, config.error_backoff_ms).await;
                }
            }
        }
    }

    async fn pause(shutdown: &ShutdownToken, ms: u64) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(tokio::time::Duration::from_millis(ms)) => {}
        }
    }
}
