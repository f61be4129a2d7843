//! Periodic, de-duplicated health checks with transition tracking.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::classify::{classify_in_window, PresentationState, StatusTransition, TRANSITION_WINDOW};
use super::probe::{check_all, Probe, DEFAULT_PROBE_TIMEOUT};
use crate::clock::{Clock, SystemClock};

/// Default time between automatic batches.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_millis(30_000);

/// Default window in which a repeated refresh of the same urls joins the
/// existing batch.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(2000);

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Timing of a [`HealthPoller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub dedup_window: Duration,
    pub transition_window: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEALTH_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            transition_window: TRANSITION_WINDOW,
        }
    }
}

/// An endpoint went online or offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub url: String,
    pub is_online: bool,
}

/// Point-in-time copy of the poller's state.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    pub statuses: HashMap<String, bool>,
    pub transitions: HashMap<String, StatusTransition>,
    pub validating: bool,
    pub window: Duration,
}

impl StatusBoard {
    /// Presentation state of `url` at `now`. Unknown urls read as offline.
    pub fn classify(&self, url: &str, now: Instant) -> PresentationState {
        let is_online = self.statuses.get(url).copied().unwrap_or(false);
        classify_in_window(
            url,
            is_online,
            &self.transitions,
            self.validating,
            now,
            self.window,
        )
    }

    /// Presentation state of every known url, sorted by url.
    pub fn classify_all(&self, now: Instant) -> BTreeMap<String, PresentationState> {
        self.statuses
            .keys()
            .map(|url| (url.clone(), self.classify(url, now)))
            .collect()
    }
}

type BatchResult = Arc<HashMap<String, bool>>;
type BatchFuture = Shared<BoxFuture<'static, BatchResult>>;

struct Batch {
    id: u64,
    urls: Vec<String>,
    started: Instant,
    result: BatchFuture,
}

#[derive(Default)]
struct State {
    statuses: HashMap<String, bool>,
    transitions: HashMap<String, StatusTransition>,
    batch: Option<Batch>,
    next_id: u64,
    validating: bool,
}

struct Inner {
    probe: Arc<dyn Probe>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    state: Mutex<State>,
    changes: broadcast::Sender<StatusChange>,
}

/// Probes a set of endpoints and remembers what it saw.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HealthPoller {
    inner: Arc<Inner>,
}

impl fmt::Debug for HealthPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthPoller")
            .field("config", &self.inner.config)
            .field("validating", &self.is_validating())
            .finish()
    }
}

impl HealthPoller {
    pub fn new(probe: Arc<dyn Probe>, config: PollerConfig) -> Self {
        Self::with_clock(probe, config, Arc::new(SystemClock))
    }

    pub fn with_clock(probe: Arc<dyn Probe>, config: PollerConfig, clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                probe,
                clock,
                config,
                state: Mutex::new(State::default()),
                changes,
            }),
        }
    }

    pub fn config(&self) -> PollerConfig {
        self.inner.config
    }

    /// Probe `urls` now and return the batch result.
    ///
    /// A call for the same url set (order and duplicates ignored) within the
    /// dedup window of the previous one joins that batch instead of probing
    /// again. Must be called from within a tokio runtime.
    pub async fn refresh(&self, urls: &[String]) -> HashMap<String, bool> {
        let result = self.batch(urls);
        result.await.as_ref().clone()
    }

    fn batch(&self, urls: &[String]) -> BatchFuture {
        let mut key = urls.to_vec();
        key.sort();
        key.dedup();

        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();

        if let Some(batch) = &state.batch {
            let fresh =
                now.saturating_duration_since(batch.started) < self.inner.config.dedup_window;
            if batch.urls == key && fresh {
                debug!(batch = batch.id, "Joining health batch");
                return batch.result.clone();
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        state.validating = true;

        // Completes even if every caller stops waiting.
        let inner = self.inner.clone();
        let urls = key.clone();
        let task = tokio::spawn(async move {
            let result = check_all(inner.probe.as_ref(), &urls, inner.config.probe_timeout).await;
            inner.complete(id, &result);
            Arc::new(result)
        });
        let result = async move {
            task.await.unwrap_or_else(|e| {
                warn!(error = %e, "Health batch task failed");
                Arc::default()
            })
        }
        .boxed()
        .shared();

        debug!(batch = id, urls = key.len(), "Starting health batch");
        state.batch = Some(Batch {
            id,
            urls: key,
            started: now,
            result: result.clone(),
        });
        result
    }

    /// Whether a batch is in flight.
    pub fn is_validating(&self) -> bool {
        self.inner.state.lock().validating
    }

    /// Last known status of `url`.
    pub fn status(&self, url: &str) -> Option<bool> {
        self.inner.state.lock().statuses.get(url).copied()
    }

    /// Copy of the current statuses, transitions and validating flag.
    pub fn board(&self) -> StatusBoard {
        let state = self.inner.state.lock();
        StatusBoard {
            statuses: state.statuses.clone(),
            transitions: state.transitions.clone(),
            validating: state.validating,
            window: self.inner.config.transition_window,
        }
    }

    /// Presentation state of `url` right now.
    pub fn classify(&self, url: &str) -> PresentationState {
        self.board().classify(url, self.inner.clock.now())
    }

    /// Receive a [`StatusChange`] for every observed flip.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.inner.changes.subscribe()
    }

    /// Refresh `urls` every interval, starting immediately.
    ///
    /// Dropping the returned handle stops polling.
    pub fn start(&self, urls: Vec<String>) -> PollingHandle {
        let (urls_tx, mut urls_rx) = watch::channel(urls);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let poller = self.clone();
        let interval = self.inner.config.interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    changed = urls_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        timer.reset();
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let urls = urls_rx.borrow_and_update().clone();
                tokio::select! {
                    _ = poller.refresh(&urls) => {}
                    _ = stop_rx.changed() => break,
                }
            }
            debug!("Health polling stopped");
        });

        PollingHandle { urls_tx, stop_tx }
    }
}

impl Inner {
    /// Fold a finished batch into the state. Runs once per batch.
    fn complete(&self, id: u64, result: &HashMap<String, bool>) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.next_id != id + 1 {
            debug!(batch = id, "Discarding superseded health batch");
            return;
        }
        state.validating = false;

        for (url, &is_online) in result {
            let Some(&previous) = state.statuses.get(url) else {
                continue;
            };
            if previous == is_online {
                continue;
            }
            info!(url = %url, online = is_online, "Endpoint status changed");
            state
                .transitions
                .insert(url.clone(), StatusTransition { previous, at: now });
            let _ = self.changes.send(StatusChange {
                url: url.clone(),
                is_online,
            });
        }

        let window = self.config.transition_window;
        state.transitions.retain(|_, t| t.is_recent(now, window));
        state.statuses = result.clone();
    }
}

/// Controls a polling task started by [`HealthPoller::start`].
#[derive(Debug)]
pub struct PollingHandle {
    urls_tx: watch::Sender<Vec<String>>,
    stop_tx: watch::Sender<bool>,
}

impl PollingHandle {
    /// Replace the polled urls and refresh them right away.
    pub fn set_urls(&self, urls: Vec<String>) {
        let _ = self.urls_tx.send(urls);
    }

    /// Stop polling.
    pub fn stop(self) {
        let _ = self.stop_tx.send(true);
    }
}
