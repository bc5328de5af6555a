//! Background worker that drains a broadcast subscription.
//!
//! Provides a generic `BackgroundWorker<R>` that feeds every message of a
//! `tokio::sync::broadcast` receiver to a `BackgroundRunnable`, one at a time.

use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Trait for task handlers executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Clone + Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called when the subscription fell behind and `missed` tasks were
    /// dropped before they could be received. Default is a no-op.
    async fn on_lagged(&mut self, _missed: u64) {}

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker driven by a broadcast receiver.
///
/// The worker spawns a tokio task that:
/// 1. Receives tasks from the subscription
/// 2. Calls `BackgroundRunnable::run()` for each task, in order
/// 3. Calls `BackgroundRunnable::on_lagged()` when tasks were missed
/// 4. Calls `BackgroundRunnable::shutdown()` when stopped or when every
///    sender is gone
pub struct BackgroundWorker<R: BackgroundRunnable> {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    _runnable: PhantomData<fn() -> R>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Start the background worker on the current tokio runtime.
    pub fn start(mut runnable: R, mut rx: broadcast::Receiver<R::Task>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    received = rx.recv() => match received {
                        Ok(task) => runnable.run(task).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            runnable.on_lagged(missed).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            runnable.shutdown().await;
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            _runnable: PhantomData,
        }
    }

    /// Whether the worker task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker gracefully, waiting for the task in progress and the
    /// runnable's shutdown hook to complete.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
