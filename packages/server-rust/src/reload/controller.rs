//! Rebuilds the implementation registry from persistence.
//!
//! A reload fetches every persisted implementation, validates each one
//! against the template registry, skips (and logs) the invalid ones and
//! publishes the rest with a single `replace_all`. A reload never runs twice
//! at the same time: a trigger that arrives mid-reload is folded into one
//! extra pass after the current one finishes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use polback_core::{ImplementationId, ServiceImplementation};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::events::SystemEvent;
use crate::service::implementations::ImplementationRegistry;
use crate::service::operation::PolicyBackedError;
use crate::service::worker::{BackgroundRunnable, BackgroundWorker};
use crate::traits::{ChangeNotifier, ImplementationStore};

/// Reload failures. Only the caller of [`ReloadController::reload`] sees
/// these; dispatch is unaffected and keeps using the previous snapshot.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("failed to fetch persisted implementations: {0}")]
    Fetch(#[source] anyhow::Error),
}

/// A persisted implementation left out of a reload.
#[derive(Debug)]
pub struct SkippedRecord {
    pub id: ImplementationId,
    pub name: String,
    pub reason: PolicyBackedError,
}

/// Result of one completed reload pass.
#[derive(Debug)]
pub struct ReloadReport {
    /// Implementations in the published snapshot.
    pub loaded: usize,
    pub skipped: Vec<SkippedRecord>,
    /// Generation of the published snapshot.
    pub generation: u64,
}

#[derive(Debug)]
pub enum ReloadOutcome {
    Completed(ReloadReport),
    /// Another reload was running; it will make one more pass on our behalf.
    Coalesced,
}

impl ReloadOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&ReloadReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Coalesced => None,
        }
    }
}

/// Clears the in-progress flag when dropped, including on cancellation.
struct ReloadingFlag<'a>(&'a AtomicBool);

impl Drop for ReloadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ReloadController {
    implementations: Arc<ImplementationRegistry>,
    store: Arc<dyn ImplementationStore>,
    subscription: Mutex<Option<broadcast::Receiver<SystemEvent>>>,
    reloading: AtomicBool,
    rerun_requested: AtomicBool,
    completed_passes: AtomicU64,
}

impl ReloadController {
    /// Subscribes to `notifier` immediately; events published from now on
    /// are handled once [`start`](Self::start) is called.
    #[must_use]
    pub fn new(
        implementations: Arc<ImplementationRegistry>,
        store: Arc<dyn ImplementationStore>,
        notifier: &dyn ChangeNotifier,
    ) -> Self {
        Self {
            implementations,
            store,
            subscription: Mutex::new(Some(notifier.subscribe())),
            reloading: AtomicBool::new(false),
            rerun_requested: AtomicBool::new(false),
            completed_passes: AtomicU64::new(0),
        }
    }

    /// Spawns the worker that turns change events into reloads.
    ///
    /// Returns `None` if the subscription was already handed to a worker.
    #[must_use]
    pub fn start(self: &Arc<Self>) -> Option<BackgroundWorker<ReloadRunnable>> {
        let rx = self.subscription.lock().take()?;
        Some(BackgroundWorker::start(ReloadRunnable::new(Arc::clone(self)), rx))
    }

    /// Whether a reload pass is running right now.
    #[must_use]
    pub fn is_reloading(&self) -> bool {
        self.reloading.load(Ordering::SeqCst)
    }

    /// Number of reload passes that ran to completion or failed.
    #[must_use]
    pub fn completed_passes(&self) -> u64 {
        self.completed_passes.load(Ordering::SeqCst)
    }

    /// Reloads the registry unless a reload is already running, in which
    /// case the running one is asked to make another pass.
    ///
    /// # Errors
    ///
    /// [`ReloadError::Fetch`] if the last pass could not reach the store.
    /// The registry keeps its previous contents.
    pub async fn reload(&self) -> Result<ReloadOutcome, ReloadError> {
        let mut flag = if let Some(flag) = self.try_begin() {
            flag
        } else {
            self.rerun_requested.store(true, Ordering::SeqCst);
            // The running pass may have ended before it could see the request.
            let Some(flag) = self.try_begin() else {
                debug!("reload already in progress; coalesced");
                return Ok(ReloadOutcome::Coalesced);
            };
            flag
        };

        loop {
            self.rerun_requested.store(false, Ordering::SeqCst);
            let result = self.reload_once().await;
            drop(flag);

            if self.rerun_requested.load(Ordering::SeqCst) {
                if let Some(next) = self.try_begin() {
                    debug!("change arrived during reload; reloading again");
                    flag = next;
                    continue;
                }
            }
            return result.map(ReloadOutcome::Completed);
        }
    }

    fn try_begin(&self) -> Option<ReloadingFlag<'_>> {
        self.reloading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ReloadingFlag(&self.reloading))
    }

    async fn reload_once(&self) -> Result<ReloadReport, ReloadError> {
        let fetched = self.store.load_all_implementations().await;
        self.completed_passes.fetch_add(1, Ordering::SeqCst);
        let records = match fetched {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "reload aborted: persisted implementations unavailable");
                return Err(ReloadError::Fetch(err));
            }
        };

        let mut builder = self.implementations.builder();
        let mut skipped = Vec::new();
        for record in records {
            let id = record.id;
            let name = record.name.clone();
            if let Err(reason) = builder.insert(ServiceImplementation::from(record)) {
                warn!(implementation = %id, name = %name, error = %reason, "skipping service implementation");
                skipped.push(SkippedRecord { id, name, reason });
            }
        }

        let loaded = builder.len();
        let generation = self.implementations.replace_all(builder);
        info!(loaded, skipped = skipped.len(), generation, "service implementations reloaded");

        Ok(ReloadReport {
            loaded,
            skipped,
            generation,
        })
    }
}

// ---------------------------------------------------------------------------
// ReloadRunnable
// ---------------------------------------------------------------------------

/// Feeds change events from the subscription into the controller.
///
/// Each trigger runs [`ReloadController::reload`] on its own task so the
/// subscription keeps draining while a pass is in progress. Triggers that
/// land mid-pass coalesce into a single extra pass.
pub struct ReloadRunnable {
    controller: Arc<ReloadController>,
    in_flight: Vec<JoinHandle<()>>,
}

impl ReloadRunnable {
    fn new(controller: Arc<ReloadController>) -> Self {
        Self {
            controller,
            in_flight: Vec::new(),
        }
    }

    fn trigger(&mut self) {
        self.in_flight.retain(|handle| !handle.is_finished());
        let controller = Arc::clone(&self.controller);
        self.in_flight.push(tokio::spawn(async move {
            // Failures are logged by the controller.
            if let Err(err) = controller.reload().await {
                debug!(error = %err, "event-driven reload failed");
            }
        }));
    }
}

#[async_trait]
impl BackgroundRunnable for ReloadRunnable {
    type Task = SystemEvent;

    async fn run(&mut self, event: SystemEvent) {
        if event.triggers_reload() {
            debug!(?event, "reload triggered");
            self.trigger();
        }
    }

    async fn on_lagged(&mut self, missed: u64) {
        // A dropped event may have been a relevant change.
        warn!(missed, "change notifications lost; reloading");
        self.trigger();
    }

    async fn shutdown(&mut self) {
        for handle in self.in_flight.drain(..) {
            if let Err(err) = handle.await {
                warn!(error = %err, "reload task ended abnormally");
            }
        }
        debug!("reload worker stopped");
    }
}
