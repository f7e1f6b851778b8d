//! Periodic feed orchestration
//!
//! State progression per fetch:
//! Idle → Fetching → (Unchanged | Updated) → Idle
//!
//! One fetch serves every subscriber: the clustered batch is shared as an
//! immutable snapshot and each subscriber applies its own filter/classify
//! pass. Subscribers are delivered to independently, each through its own
//! task, so a slow or failing renderer never stalls the others.

use crate::cluster::{ClusterEngine, ClusterSettings};
use crate::dedup::are_equivalent;
use crate::error::Error;
use crate::feed::FeedSource;
use crate::model::{validate_batch, SeismicEvent};
use chrono::{DateTime, Utc};
use flatland_common::events::{EventBus, FeedEvent, FetchErrorKind};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default fetch interval (5 minutes)
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(300);

/// Immutable clustered batch shared with all subscribers
pub type ClusteredBatch = Arc<Vec<SeismicEvent>>;

/// Subscriber callback; errors are logged and do not affect other subscribers
pub type SubscriberCallback = Arc<dyn Fn(ClusteredBatch) -> anyhow::Result<()> + Send + Sync>;

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedState {
    Idle,
    Fetching,
    /// Fetched batch matched the accepted one (transient)
    Unchanged,
    /// A new batch was accepted (transient)
    Updated,
}

/// Result of one fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// New batch accepted and published
    Updated { parents: usize, rejected: usize },
    /// Same event IDs as the accepted batch; nothing published
    Unchanged,
    /// Feed failed; previous batch retained
    Failed(FetchErrorKind),
    /// Another fetch was in flight (or the orchestrator was not idle)
    Skipped,
    /// Feed was stopped while this fetch was in flight
    Discarded,
}

/// Identifies a subscription for `unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    interval: Duration,
    cluster: Option<ClusterSettings>,
}

impl OrchestratorSettings {
    /// `cluster: None` disables clustering; batches pass through as fetched
    ///
    /// The timer period must be non-zero.
    pub fn new(interval: Duration, cluster: Option<ClusterSettings>) -> crate::error::Result<Self> {
        if interval.is_zero() {
            return Err(Error::Config("fetch interval must be greater than zero".to_string()));
        }
        Ok(Self { interval, cluster })
    }

    /// Period of the fetch timer
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cluster(&self) -> Option<&ClusterSettings> {
        self.cluster.as_ref()
    }
}

struct Subscriber {
    handle: SubscriptionHandle,
    name: String,
    tx: mpsc::UnboundedSender<ClusteredBatch>,
    task: JoinHandle<()>,
}

/// Last accepted batch, before and after clustering
#[derive(Default)]
struct Accepted {
    events: Vec<SeismicEvent>,
    clustered: ClusteredBatch,
}

struct Inner {
    source: Arc<dyn FeedSource>,
    settings: OrchestratorSettings,
    cluster_engine: Option<ClusterEngine>,
    event_bus: EventBus,
    state: watch::Sender<FeedState>,
    accepted: RwLock<Accepted>,
    last_success: RwLock<Option<DateTime<Utc>>>,
    /// Bumped by `stop`; fetches started under an older value are discarded
    generation: AtomicU64,
    /// Generation of the running fetch, or `NO_FETCH`
    in_flight: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
    timer: Mutex<Option<CancellationToken>>,
}

/// Periodic fetch scheduler with fan-out to subscribers
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct FeedOrchestrator {
    inner: Arc<Inner>,
}

const NO_FETCH: u64 = u64::MAX;

/// Releases the in-flight slot even if the fetch future is dropped
///
/// A fetch from a newer generation may have taken the slot over; it is
/// left untouched.
struct InFlightGuard<'a> {
    slot: &'a AtomicU64,
    generation: u64,
}

impl InFlightGuard<'_> {
    fn owns_slot(&self) -> bool {
        self.slot.load(Ordering::Acquire) == self.generation
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .slot
            .compare_exchange(self.generation, NO_FETCH, Ordering::AcqRel, Ordering::Acquire);
    }
}

impl FeedOrchestrator {
    pub fn new(source: Arc<dyn FeedSource>, settings: OrchestratorSettings, event_bus: EventBus) -> Self {
        let (state, _) = watch::channel(FeedState::Idle);
        let cluster_engine = settings.cluster().copied().map(ClusterEngine::new);

        Self {
            inner: Arc::new(Inner {
                source,
                settings,
                cluster_engine,
                event_bus,
                state,
                accepted: RwLock::new(Accepted::default()),
                last_success: RwLock::new(None),
                generation: AtomicU64::new(0),
                in_flight: AtomicU64::new(NO_FETCH),
                subscribers: Mutex::new(Vec::new()),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> FeedState {
        *self.inner.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<FeedState> {
        self.inner.state.subscribe()
    }

    /// Most recently accepted clustered batch (empty before the first update)
    pub async fn current_batch(&self) -> ClusteredBatch {
        self.inner.accepted.read().await.clustered.clone()
    }

    /// When the last fetch completed successfully, changed or not
    pub async fn last_successful_fetch(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_success.read().await
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Register a subscriber
    ///
    /// Each subscriber gets a dedicated delivery task (spawned on the current
    /// tokio runtime) and receives every later batch in order. The callback
    /// runs on the blocking pool; a panic or error is logged and delivery
    /// continues with the next batch.
    pub async fn subscribe<F>(&self, name: impl Into<String>, callback: F) -> SubscriptionHandle
    where
        F: Fn(ClusteredBatch) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(Uuid::new_v4());
        let name = name.into();
        let callback: SubscriberCallback = Arc::new(callback);
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(deliver_batches(name.clone(), callback, rx));

        let mut subscribers = self.inner.subscribers.lock().await;
        subscribers.push(Subscriber { handle, name: name.clone(), tx, task });
        info!(subscriber = %name, total = subscribers.len(), "Subscriber registered");

        handle
    }

    /// Remove a subscriber; batches already queued for it are still delivered
    ///
    /// Returns false if the handle is unknown.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscribers = self.inner.subscribers.lock().await;
        match subscribers.iter().position(|s| s.handle == handle) {
            Some(idx) => {
                let removed = subscribers.remove(idx);
                info!(subscriber = %removed.name, "Subscriber removed");
                // Dropping the sender ends the delivery task after it drains
                true
            }
            None => false,
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().await.len()
    }

    /// Start the periodic fetch timer; the first tick fires immediately
    ///
    /// No-op if already running.
    pub async fn start(&self) {
        let mut timer = self.inner.timer.lock().await;
        if timer.is_some() {
            debug!("Feed already running");
            return;
        }

        let token = CancellationToken::new();
        *timer = Some(token.clone());

        let interval = self.inner.settings.interval();
        info!(
            source = self.inner.source.name(),
            interval_secs = interval.as_secs_f64(),
            "Starting earthquake feed"
        );

        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // Fetch off the timer task so ticks during a fetch are dropped
                        let o = orchestrator.clone();
                        tokio::spawn(async move {
                            o.fetch_now().await;
                        });
                    }
                }
            }

            debug!("Feed timer stopped");
        });
    }

    /// Stop the timer and invalidate any in-flight fetch
    ///
    /// The accepted batch is kept. A stale fetch still waiting on the feed
    /// does not block fetches of the new generation.
    pub async fn stop(&self) {
        let token = self.inner.timer.lock().await.take();
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.set_state(FeedState::Idle);

        if let Some(token) = token {
            token.cancel();
            info!(generation, "Earthquake feed stopped");
        }

        self.inner.event_bus.emit_lossy(FeedEvent::FeedStopped {
            generation,
            timestamp: Utc::now(),
        });
    }

    pub async fn is_running(&self) -> bool {
        self.inner.timer.lock().await.is_some()
    }

    /// Stop the feed, drop all subscribers and wait for queued deliveries
    pub async fn shutdown(&self) {
        self.stop().await;

        let subscribers: Vec<Subscriber> = self.inner.subscribers.lock().await.drain(..).collect();
        for subscriber in subscribers {
            drop(subscriber.tx);
            if let Err(e) = subscriber.task.await {
                warn!(subscriber = %subscriber.name, "Delivery task ended abnormally: {}", e);
            }
        }
    }

    /// User/debug triggered fetch; no-op unless Idle
    pub async fn force_fetch(&self) -> FetchOutcome {
        if self.state() != FeedState::Idle {
            debug!(state = ?self.state(), "Force fetch ignored, orchestrator busy");
            return FetchOutcome::Skipped;
        }
        self.fetch_now().await
    }

    /// One timer tick: fetch unless a fetch of this generation is in flight
    ///
    /// A fetch left over from before `stop` does not count; its result is
    /// discarded when it arrives.
    pub async fn fetch_now(&self) -> FetchOutcome {
        let generation = self.generation();
        let mut current = self.inner.in_flight.load(Ordering::Acquire);
        loop {
            // Never hand the slot back to an older generation
            if current != NO_FETCH && current >= generation {
                debug!(generation, "Fetch already in flight, dropping tick");
                return FetchOutcome::Skipped;
            }
            match self.inner.in_flight.compare_exchange(
                current,
                generation,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        if current != NO_FETCH {
            debug!(stale = current, generation, "Superseding stale in-flight fetch");
        }
        let guard = InFlightGuard {
            slot: &self.inner.in_flight,
            generation,
        };

        let outcome = self.run_fetch(generation).await;
        // A newer fetch owns the state once it has taken the slot
        if guard.owns_slot() {
            self.set_state(FeedState::Idle);
        }
        outcome
    }

    async fn run_fetch(&self, generation: u64) -> FetchOutcome {
        self.set_state(FeedState::Fetching);
        self.inner.event_bus.emit_lossy(FeedEvent::FetchStarted {
            generation,
            timestamp: Utc::now(),
        });

        let result = self.inner.source.fetch_events().await;

        if self.generation() != generation {
            debug!(generation, "Discarding result of stale fetch");
            return FetchOutcome::Discarded;
        }

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    source = self.inner.source.name(),
                    kind = %e.kind(),
                    "Earthquake fetch failed, keeping previous batch: {}",
                    e
                );
                self.inner.event_bus.emit_lossy(FeedEvent::FetchFailed {
                    generation,
                    kind: e.kind(),
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return FetchOutcome::Failed(e.kind());
            }
        };

        let validated = validate_batch(raw);
        let rejected = validated.rejected_count();
        if rejected > 0 {
            self.inner.event_bus.emit_lossy(FeedEvent::EventsRejected {
                generation,
                rejected,
                timestamp: Utc::now(),
            });
        }

        let mut accepted = self.inner.accepted.write().await;
        // stop() may have run while waiting for the lock
        if self.generation() != generation {
            debug!(generation, "Discarding result of stale fetch");
            return FetchOutcome::Discarded;
        }
        *self.inner.last_success.write().await = Some(Utc::now());

        if are_equivalent(&accepted.events, &validated.events) {
            drop(accepted);
            debug!(count = validated.events.len(), "Earthquake batch unchanged");
            self.set_state(FeedState::Unchanged);
            self.inner.event_bus.emit_lossy(FeedEvent::BatchUnchanged {
                generation,
                event_count: validated.events.len(),
                timestamp: Utc::now(),
            });
            return FetchOutcome::Unchanged;
        }

        let event_count = validated.events.len();
        let clustered = match &self.inner.cluster_engine {
            Some(engine) => engine.cluster(&validated.events),
            None => validated.events.clone(),
        };
        let clustered: ClusteredBatch = Arc::new(clustered);
        accepted.events = validated.events;
        accepted.clustered = clustered.clone();
        drop(accepted);

        let parents = clustered.len();
        info!(events = event_count, parents, rejected, "Earthquake batch updated");
        self.set_state(FeedState::Updated);
        self.inner.event_bus.emit_lossy(FeedEvent::BatchUpdated {
            generation,
            event_count,
            parent_count: parents,
            timestamp: Utc::now(),
        });

        self.publish(clustered).await;

        FetchOutcome::Updated { parents, rejected }
    }

    /// Queue a batch on every subscriber's delivery channel, in registration order
    async fn publish(&self, batch: ClusteredBatch) {
        let subscribers = self.inner.subscribers.lock().await;
        for subscriber in subscribers.iter() {
            if subscriber.tx.send(batch.clone()).is_err() {
                error!(subscriber = %subscriber.name, "Subscriber delivery task is gone");
            }
        }
    }

    fn set_state(&self, state: FeedState) {
        self.inner.state.send_replace(state);
    }
}

/// Delivery loop for one subscriber
async fn deliver_batches(
    name: String,
    callback: SubscriberCallback,
    mut rx: mpsc::UnboundedReceiver<ClusteredBatch>,
) {
    while let Some(batch) = rx.recv().await {
        let cb = callback.clone();
        let count = batch.len();
        match tokio::task::spawn_blocking(move || cb(batch)).await {
            Ok(Ok(())) => debug!(subscriber = %name, count, "Batch delivered"),
            Ok(Err(e)) => error!(subscriber = %name, "Subscriber failed to handle batch: {:#}", e),
            Err(e) if e.is_panic() => error!(subscriber = %name, "Subscriber panicked handling batch"),
            Err(e) => error!(subscriber = %name, "Subscriber task failed: {}", e),
        }
    }
    debug!(subscriber = %name, "Delivery task finished");
}
