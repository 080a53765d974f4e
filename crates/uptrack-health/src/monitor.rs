//! Uptime monitor: the driver that feeds probe results into endpoints.
//!
//! A sweep runs in three phases:
//!
//! 1. open the store and list the endpoints;
//! 2. probe them concurrently (one task per endpoint, bounded by a
//!    semaphore) with the store closed;
//! 3. reopen the store and, endpoint by endpoint, re-read it, apply the
//!    observation, save it, append to the health-check log and publish an
//!    `EndpointUpdated` event.
//!
//! With [`StoreAccess::OnDemand`] the database file is only locked during
//! phases 1 and 3, so other processes can use it between and during
//! sweeps. Sweeps run back to back, so an endpoint is never updated by two
//! tasks at once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use uptrack_core::{EndpointId, EndpointUpdated, Observation};
use uptrack_state::StateStore;

use crate::probe::{into_observation, Prober};
use crate::publisher::EventPublisher;

/// Default bound on in-flight probes per sweep.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// How the monitor reaches its store.
#[derive(Clone)]
pub enum StoreAccess {
    /// One store kept open for the monitor's lifetime.
    Held(StateStore),
    /// Open the database file for each phase that needs it and close it
    /// again, waiting up to `lock_wait` if another process holds it.
    OnDemand { path: PathBuf, lock_wait: Duration },
}

impl From<StateStore> for StoreAccess {
    fn from(store: StateStore) -> Self {
        StoreAccess::Held(store)
    }
}

impl StoreAccess {
    async fn open(&self) -> anyhow::Result<StateStore> {
        match self {
            StoreAccess::Held(store) => Ok(store.clone()),
            StoreAccess::OnDemand { path, lock_wait } => {
                let path = path.clone();
                let wait = *lock_wait;
                let store =
                    tokio::task::spawn_blocking(move || StateStore::open_waiting(&path, wait))
                        .await??;
                Ok(store)
            }
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Endpoints whose observation was applied and saved.
    pub probed: usize,
    pub up: usize,
    pub down: usize,
    /// Endpoints deleted between listing and applying.
    pub skipped: usize,
    /// Endpoints that could not be updated (rejected observation, storage error).
    pub failed: usize,
}

/// What happened to one endpoint during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckOutcome {
    Up,
    Down,
    Skipped,
    Failed,
}

impl SweepSummary {
    fn add(&mut self, outcome: CheckOutcome) {
        match outcome {
            CheckOutcome::Up => {
                self.probed += 1;
                self.up += 1;
            }
            CheckOutcome::Down => {
                self.probed += 1;
                self.down += 1;
            }
            CheckOutcome::Skipped => self.skipped += 1,
            CheckOutcome::Failed => self.failed += 1,
        }
    }
}

/// Periodically probes every stored endpoint.
pub struct UptimeMonitor<P> {
    store: StoreAccess,
    prober: Arc<P>,
    publisher: Arc<dyn EventPublisher>,
    concurrency: usize,
}

impl<P: Prober> UptimeMonitor<P> {
    pub fn new(
        store: impl Into<StoreAccess>,
        prober: P,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store: store.into(),
            prober: Arc::new(prober),
            publisher,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Bound the number of probes in flight (at least one).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Probe every endpoint once and fold the results in.
    ///
    /// Only opening the store and listing the endpoints can fail the sweep;
    /// per-endpoint errors are logged and counted in the summary.
    pub async fn sweep(&self) -> anyhow::Result<SweepSummary> {
        let targets: Vec<(EndpointId, String)> = {
            let store = self.store.open().await?;
            store
                .list_endpoints()?
                .into_iter()
                .map(|endpoint| (endpoint.id().clone(), endpoint.url().as_str().to_string()))
                .collect()
        };

        let mut summary = SweepSummary::default();
        if targets.is_empty() {
            return Ok(summary);
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for (id, url) in targets {
            let prober = Arc::clone(&self.prober);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = prober.probe(&url).await;
                if let Err(e) = &result {
                    debug!(endpoint_id = %id, error = %e, "probe failed");
                }
                let obs = into_observation(result, Utc::now());
                (id, url, obs)
            });
        }

        let mut observed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => observed.push(result),
                Err(e) => {
                    error!(error = %e, "probe task failed");
                    summary.add(CheckOutcome::Failed);
                }
            }
        }

        let store = self.store.open().await?;
        for (id, url, obs) in &observed {
            summary.add(commit_observation(&store, self.publisher.as_ref(), id, url, obs));
        }

        debug!(
            probed = summary.probed,
            up = summary.up,
            down = summary.down,
            skipped = summary.skipped,
            failed = summary.failed,
            "sweep complete"
        );
        Ok(summary)
    }

    /// Sweep every `interval` until `shutdown` flips to true.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(?interval, concurrency = self.concurrency, "uptime monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(summary) => info!(
                            probed = summary.probed,
                            down = summary.down,
                            failed = summary.failed,
                            "sweep finished"
                        ),
                        Err(e) => error!(error = %e, "sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("uptime monitor shutting down");
                    break;
                }
            }
        }

        info!("uptime monitor stopped");
    }
}

/// Fold one probe result into the stored endpoint and announce it.
fn commit_observation(
    store: &StateStore,
    publisher: &dyn EventPublisher,
    id: &EndpointId,
    url: &str,
    obs: &Observation,
) -> CheckOutcome {
    // Re-read so the update lands on the latest stored state.
    let mut endpoint = match store.find_endpoint(id) {
        Ok(Some(endpoint)) => endpoint,
        Ok(None) => {
            debug!(endpoint_id = %id, "endpoint removed before update");
            return CheckOutcome::Skipped;
        }
        Err(e) => {
            error!(endpoint_id = %id, error = %e, "failed to load endpoint");
            return CheckOutcome::Failed;
        }
    };

    let was_down = endpoint.is_down();
    if let Err(e) = endpoint.apply_observation(obs) {
        warn!(endpoint_id = %id, error = %e, "observation rejected");
        return CheckOutcome::Failed;
    }
    match (was_down, endpoint.is_down()) {
        (false, true) => warn!(endpoint_id = %id, %url, "endpoint went down"),
        (true, false) => info!(
            endpoint_id = %id,
            %url,
            downtime_minutes = endpoint.cumulative_downtime_minutes(),
            "endpoint recovered"
        ),
        _ => {}
    }

    if let Err(e) = store.save_endpoint(&endpoint) {
        error!(endpoint_id = %id, error = %e, "failed to save endpoint");
        return CheckOutcome::Failed;
    }

    let event = EndpointUpdated::new(&endpoint, obs);
    if let Err(e) = store.record_health_check(&event) {
        warn!(endpoint_id = %id, error = %e, "failed to record health check");
    }
    publisher.publish(&event);

    if obs.succeeded() {
        CheckOutcome::Up
    } else {
        CheckOutcome::Down
    }
}
