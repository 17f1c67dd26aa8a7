//! Keeps the registry in sync with the discovery source.
//!
//! A refresh is one fetch-validate-replace-publish cycle. Refreshes run:
//! - once, immediately, from [`RegistryRefresher::start`]
//! - on every tick of the background worker's interval
//! - after every [`RegistryRefresher::report_unhealthy`], fire-and-forget
//!
//! A single async lock spans the whole cycle, so refreshes never overlap and
//! a refresh's events are published after its replace is visible and before
//! the next refresh begins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use balance_core::{parse_node_list, ChangeSummary, RegistryEvent};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::notifier::ChangeNotifier;
use super::store::RegistryStore;
use crate::error::DiscoveryError;
use crate::traits::DiscoverySource;
use crate::worker::{BackgroundRunnable, BackgroundWorker, SubmitError};

/// On-demand work queued to the refresh worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshTask {
    /// A node at `address` failed a proxy attempt and was evicted.
    Unhealthy { address: String },
}

// ---------------------------------------------------------------------------
// RefreshCore
// ---------------------------------------------------------------------------

/// State shared between the refresher handle and its worker task.
struct RefreshCore {
    store: Arc<RegistryStore>,
    notifier: Arc<ChangeNotifier>,
    source: Arc<dyn DiscoverySource>,
    type_filter: String,
    cycle: tokio::sync::Mutex<()>,
}

impl RefreshCore {
    async fn refresh(&self) -> Result<ChangeSummary, DiscoveryError> {
        let _cycle = self.cycle.lock().await;

        match self.fetch_nodes().await {
            Ok(nodes) => {
                let summary = self.store.replace(nodes);
                metrics::counter!("balance_refresh_total", "result" => "ok").increment(1);
                #[allow(clippy::cast_precision_loss)]
                metrics::gauge!("balance_registry_nodes").set(summary.servers.len() as f64);

                if summary.changed {
                    info!(
                        servers = summary.servers.len(),
                        added = summary.added.len(),
                        "Registry changed"
                    );
                }
                self.notifier.publish_all(&summary.events());
                Ok(summary)
            }
            Err(err) => {
                metrics::counter!("balance_refresh_total", "result" => "error").increment(1);
                warn!(error = %err, "Registry refresh failed; keeping current node set");
                self.notifier.publish(&RegistryEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    async fn fetch_nodes(&self) -> Result<Vec<balance_core::Node>, DiscoveryError> {
        let body = self.source.fetch(&self.type_filter).await?;
        Ok(parse_node_list(&body)?)
    }
}

// ---------------------------------------------------------------------------
// RefreshRunnable
// ---------------------------------------------------------------------------

struct RefreshRunnable {
    core: Arc<RefreshCore>,
}

#[async_trait]
impl BackgroundRunnable for RefreshRunnable {
    type Task = RefreshTask;

    async fn run(&mut self, task: RefreshTask) {
        let RefreshTask::Unhealthy { address } = task;
        debug!(%address, "Refreshing after unhealthy report");
        // Failures are logged and published inside refresh().
        let _ = self.core.refresh().await;
    }

    async fn on_tick(&mut self) {
        let _ = self.core.refresh().await;
    }

    async fn shutdown(&mut self) {
        debug!("Registry refresh schedule stopped");
    }
}

// ---------------------------------------------------------------------------
// RegistryRefresher
// ---------------------------------------------------------------------------

/// Periodic and on-demand puller feeding the [`RegistryStore`].
pub struct RegistryRefresher {
    core: Arc<RefreshCore>,
    worker: Mutex<Option<BackgroundWorker<RefreshRunnable>>>,
}

impl RegistryRefresher {
    /// Creates a refresher that fetches every node type.
    #[must_use]
    pub fn new(
        store: Arc<RegistryStore>,
        notifier: Arc<ChangeNotifier>,
        source: Arc<dyn DiscoverySource>,
    ) -> Self {
        Self::with_type_filter(store, notifier, source, String::new())
    }

    /// Creates a refresher that asks the discovery source for one node type.
    #[must_use]
    pub fn with_type_filter(
        store: Arc<RegistryStore>,
        notifier: Arc<ChangeNotifier>,
        source: Arc<dyn DiscoverySource>,
        type_filter: String,
    ) -> Self {
        Self {
            core: Arc::new(RefreshCore {
                store,
                notifier,
                source,
                type_filter,
                cycle: tokio::sync::Mutex::new(()),
            }),
            worker: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn store(&self) -> Arc<RegistryStore> {
        Arc::clone(&self.core.store)
    }

    #[must_use]
    pub fn notifier(&self) -> Arc<ChangeNotifier> {
        Arc::clone(&self.core.notifier)
    }

    /// Runs one refresh cycle and returns its change summary.
    ///
    /// # Errors
    ///
    /// Returns the fetch or validation error; the store is left untouched
    /// and an `error` event is published.
    pub async fn refresh(&self) -> Result<ChangeSummary, DiscoveryError> {
        self.core.refresh().await
    }

    /// Refreshes once now, then every `interval` until [`Self::stop`].
    ///
    /// The schedule starts even if the first refresh fails; the next tick
    /// retries. Calling `start` on a running refresher only refreshes.
    ///
    /// # Errors
    ///
    /// Returns the error of the immediate refresh.
    pub async fn start(&self, interval: Duration) -> Result<ChangeSummary, DiscoveryError> {
        let result = self.core.refresh().await;

        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(BackgroundWorker::is_running) {
            warn!("Registry refresher already started");
        } else {
            info!(interval_secs = interval.as_secs_f64(), "Starting registry refresh schedule");
            let runnable = RefreshRunnable {
                core: Arc::clone(&self.core),
            };
            *worker = Some(BackgroundWorker::start(runnable, interval));
        }

        result
    }

    /// Cancels the recurring schedule. Idempotent.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            worker.stop().await;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(BackgroundWorker::is_running)
    }

    /// Evicts the node at `address` and schedules a refresh without waiting
    /// for it.
    ///
    /// The refresh re-pulls the authoritative list, so the discovery source
    /// can confirm the eviction or bring the node back. Returns whether a
    /// node was removed; an unknown address still schedules a refresh.
    pub fn report_unhealthy(&self, address: &str) -> bool {
        let removed = self.core.store.remove(address);
        if removed {
            metrics::counter!("balance_evictions_total").increment(1);
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!("balance_registry_nodes").set(self.core.store.len() as f64);
            info!(%address, "Evicted unhealthy node");
        } else {
            debug!(%address, "Unhealthy node already absent from registry");
        }

        let task = RefreshTask::Unhealthy {
            address: address.to_string(),
        };
        let submitted = self.worker.lock().as_ref().map(|w| w.try_submit(task));

        match submitted {
            Some(Ok(())) => {}
            Some(Err(SubmitError::Full)) => {
                debug!("Refresh queue full; pending refreshes will pick up the eviction");
            }
            Some(Err(SubmitError::Stopped)) | None => {
                let core = Arc::clone(&self.core);
                tokio::spawn(async move {
                    let _ = core.refresh().await;
                });
            }
        }

        removed
    }
}

impl std::fmt::Debug for RegistryRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryRefresher")
            .field("type_filter", &self.core.type_filter)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
