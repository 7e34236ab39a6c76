//! Scheduled refresh coordinator.
//!
//! The coordinator owns the [`CoordinatorState`], drives a fixed-interval
//! refresh from a single tokio task and fans out a [`RefreshEvent`] after
//! every completed cycle. At most one fetch is ever in flight: scheduled and
//! manual refreshes share a single-flight guard and a cycle that finds the
//! guard taken is skipped. Stopping the coordinator discards the result of
//! any refresh that started before the stop, manual ones included.

use crate::fetcher::{CheckResult, CheckSource, FetchErrorKind};
use crate::state::CoordinatorState;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

/// Notification sent to subscribers after each completed refresh cycle.
#[derive(Debug, Clone)]
pub enum RefreshEvent {
    /// Fresh data replaced the stored result.
    Updated(CheckResult),
    /// The refresh failed. The stored result, if any, is unchanged.
    UpdateFailed {
        kind: FetchErrorKind,
        message: String,
    },
}

/// Outcome of a single refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    Failed(FetchErrorKind),
    /// Another refresh was still running.
    Skipped,
    /// The coordinator was stopped while the fetch was in flight.
    Abandoned,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    source: Arc<dyn CheckSource>,
    interval: Duration,
    state: CoordinatorState,
    events: broadcast::Sender<RefreshEvent>,
    refresh_lock: tokio::sync::Mutex<()>,
    worker: Mutex<Option<Worker>>,
    /// Bumped by every stop. A refresh only commits under the epoch it began in.
    epoch: Mutex<u64>,
}

/// Handle to the refresh coordinator. Clones share the same state and schedule.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Create an idle coordinator with empty state.
    pub fn new(source: Arc<dyn CheckSource>, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                source,
                interval,
                state: CoordinatorState::new(),
                events,
                refresh_lock: tokio::sync::Mutex::new(()),
                worker: Mutex::new(None),
                epoch: Mutex::new(0),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Latest successfully fetched result.
    pub fn current(&self) -> Option<CheckResult> {
        self.inner.state.get()
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.inner.state
    }

    pub fn last_update_success(&self) -> bool {
        self.inner.state.last_update_success()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.state.consecutive_failures()
    }

    /// Subscribe to refresh notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.inner.events.subscribe()
    }

    /// Run one refresh cycle now.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.inner.refresh().await
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .worker
            .lock()
            .map(|w| w.as_ref().map_or(false, |w| !w.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Start the periodic refresh. The first scheduled cycle fires one interval
    /// from now. Returns false if the schedule was already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let Ok(mut worker) = self.inner.worker.lock() else {
            return false;
        };
        if worker.is_some() {
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(Arc::clone(&self.inner), shutdown_rx));
        *worker = Some(Worker { shutdown, handle });

        info!(
            source = self.inner.source.name(),
            interval_secs = self.inner.interval.as_secs(),
            "Refresh schedule started"
        );
        true
    }

    /// Stop the schedule, abandoning any fetch still in flight.
    pub async fn stop(&self) {
        if let Ok(mut epoch) = self.inner.epoch.lock() {
            *epoch = epoch.wrapping_add(1);
        }

        let worker = match self.inner.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };

        if let Some(worker) = worker {
            let _ = worker.shutdown.send(true);
            if let Err(e) = worker.handle.await {
                warn!(error = %e, "Refresh task ended abnormally");
            }
            info!(source = self.inner.source.name(), "Refresh schedule stopped");
        }
    }
}

impl Inner {
    fn epoch(&self) -> u64 {
        self.epoch.lock().map(|epoch| *epoch).unwrap_or(0)
    }

    async fn refresh(&self) -> RefreshOutcome {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            debug!(source = self.source.name(), "Refresh already in progress, skipping");
            return RefreshOutcome::Skipped;
        };

        let started = Instant::now();
        let epoch = self.epoch();
        let fetched = self.source.fetch().await;

        // Held until the state write and the notification are done
        let Ok(current_epoch) = self.epoch.lock() else {
            return RefreshOutcome::Abandoned;
        };
        if *current_epoch != epoch {
            debug!(
                source = self.source.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Coordinator stopped during refresh, discarding result"
            );
            return RefreshOutcome::Abandoned;
        }

        match fetched {
            Ok(result) => {
                self.state.replace(result.clone());
                debug!(
                    source = self.source.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    noise = result.is_noise(),
                    "Refresh succeeded"
                );
                let _ = self.events.send(RefreshEvent::Updated(result));
                RefreshOutcome::Updated
            }
            Err(e) => {
                let kind = e.kind();
                self.state.record_failure(kind);
                warn!(
                    source = self.source.name(),
                    kind = %kind,
                    transport = kind.is_transport(),
                    error = %e,
                    consecutive_failures = self.state.consecutive_failures(),
                    "Refresh failed, keeping last known result"
                );
                let _ = self.events.send(RefreshEvent::UpdateFailed {
                    kind,
                    message: e.to_string(),
                });
                RefreshOutcome::Failed(kind)
            }
        }
    }
}

async fn run(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    // tokio panics on a zero period
    let period = inner.interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!(source = inner.source.name(), "Abandoning in-flight refresh");
                break;
            }
            _ = inner.refresh() => {}
        }
    }
}
