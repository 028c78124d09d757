//! The tracker: sampling, session, queue, connectivity and delivery wired together
//!
//! A [`Tracker`] is a cheap, clonable handle. All state mutations go through
//! one lock that is never held across an `.await`, so producers can keep
//! enqueueing while a batch is in flight.
//!
//! ## Flush triggers
//!
//! - the auto-mode timer (`flush_interval_ms`)
//! - the queue reaching `batch_size` (auto mode)
//! - connectivity being restored (auto mode)
//! - an explicit [`Tracker::flush_events`] call
//! - [`Tracker::cleanup`], which sends a final unloading batch in any mode

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::runtime::Handle;

use crate::collector::{BatchPayload, HttpTransport, Transport};
use crate::config::{Config, TrackerConfig};
use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::delivery::{DeliveryEngine, FlushOutcome, SkipReason};
use crate::environment::{Clock, HostEnvironment, PageContext, StaticEnvironment, SystemClock};
use crate::error::{Error, Result};
use crate::identity::resolve_user_id;
use crate::queue::EventQueue;
use crate::sampling::Sampler;
use crate::scheduler::FlushScheduler;
use crate::session::{Session, SessionManager};
use crate::store::{MemoryStore, SqliteStore, Store};
use crate::types::{
    CustomEvent, EventOptions, ObservationKind, PageviewEvent, PageviewOptions, QueueStatus,
    QueuedEvent,
};

/// Handle to a running tracker
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<Inner>,
}

struct Inner {
    config: TrackerConfig,
    user_id: String,
    store: Arc<dyn Store>,
    environment: Arc<dyn HostEnvironment>,
    clock: Arc<dyn Clock>,
    delivery: DeliveryEngine,
    runtime: Handle,
    state: Mutex<State>,
    scheduler: Mutex<FlushScheduler>,
}

struct State {
    session: SessionManager,
    queue: EventQueue,
    sampler: Sampler,
    connectivity: ConnectivityMonitor,
    manual_flush: bool,
    closed: bool,
}

/// Builder for [`Tracker`]
///
/// Every collaborator is optional. Defaults: the SQLite store at
/// [`Config::database_path`] (falling back to memory if it cannot be
/// opened), [`HttpTransport`], [`StaticEnvironment`] and [`SystemClock`].
pub struct TrackerBuilder {
    config: TrackerConfig,
    store: Option<Arc<dyn Store>>,
    transport: Option<Arc<dyn Transport>>,
    environment: Option<Arc<dyn HostEnvironment>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TrackerBuilder {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            store: None,
            transport: None,
            environment: None,
            clock: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn environment(mut self, environment: Arc<dyn HostEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration, restore persisted state and start timers
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Tracker> {
        let config = self.config;
        config.validate()?;

        let runtime = Handle::try_current()
            .map_err(|e| Error::Runtime(format!("a tokio runtime is required: {}", e)))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config)?),
        };
        let store = self.store.unwrap_or_else(|| default_store(config.debug));
        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(StaticEnvironment::default()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let now = clock.now();
        let page = environment.page();

        let user_id = resolve_user_id(store.as_ref(), config.debug);
        let session = SessionManager::start(
            store.clone(),
            config.session_timeout(),
            config.debug,
            now,
            &page,
        );
        let queue = if config.enable_offline_tracking {
            EventQueue::rehydrate(store.clone(), config.debug)
        } else {
            EventQueue::in_memory(store.clone(), config.debug)
        };

        let state = State {
            session,
            queue,
            sampler: Sampler::new(config.sampling_rate),
            connectivity: ConnectivityMonitor::new(environment.is_online()),
            manual_flush: config.manual_flush,
            closed: false,
        };

        let tracker = Tracker {
            inner: Arc::new(Inner {
                user_id,
                store,
                environment,
                clock,
                delivery: DeliveryEngine::new(transport),
                runtime,
                state: Mutex::new(state),
                scheduler: Mutex::new(FlushScheduler::new()),
                config,
            }),
        };

        tracker.start_session_timer();
        if !tracker.inner.config.manual_flush {
            tracker.start_flush_timer();
        }

        tracing::info!(
            site_id = %tracker.inner.config.site_id,
            user_id = %tracker.inner.user_id,
            manual_flush = tracker.inner.config.manual_flush,
            queued = tracker.lock_state().queue.len(),
            "Tracker initialized"
        );

        if tracker.inner.config.auto_track {
            tracker.track_pageview(PageviewOptions::default())?;
        }

        Ok(tracker)
    }
}

fn default_store(debug: bool) -> Arc<dyn Store> {
    let path = Config::database_path();
    match SqliteStore::open(&path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            if debug {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Durable store unavailable, keeping state in memory"
                );
            }
            Arc::new(MemoryStore::new())
        }
    }
}

impl Tracker {
    /// Start building a tracker
    pub fn builder(config: TrackerConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    // ============================================
    // Producers
    // ============================================

    /// Record a pageview; unset fields come from the current page
    pub fn track_pageview(&self, opts: PageviewOptions) -> Result<()> {
        let page = self.inner.environment.page();
        self.enqueue(ObservationKind::Pageview, &page, |timestamp| {
            QueuedEvent::Pageview(PageviewEvent {
                path: opts.path.unwrap_or_else(|| page.path.clone()),
                content_type: opts.content_type,
                referrer: opts.referrer.unwrap_or_else(|| page.referrer.clone()),
                language: opts.language.unwrap_or_else(|| page.locale.clone()),
                title: opts.title.unwrap_or_else(|| page.title.clone()),
                is_virtual: opts.is_virtual,
                timestamp,
            })
        })
    }

    /// Record a custom event
    pub fn track_event(&self, opts: EventOptions) -> Result<()> {
        if opts.event_name.trim().is_empty() {
            return Err(Error::Config("event_name is required".to_string()));
        }
        let page = self.inner.environment.page();
        self.enqueue(ObservationKind::Event, &page, |timestamp| {
            QueuedEvent::Event(CustomEvent {
                event_name: opts.event_name,
                event_category: opts.event_category,
                event_label: opts.event_label,
                event_value: opts.event_value,
                properties: opts.properties,
                timestamp,
            })
        })
    }

    /// Activity signal from the host (scroll, focus, visibility)
    pub fn record_activity(&self) -> Result<()> {
        let now = self.inner.clock.now();
        let page = self.inner.environment.page();
        let mut state = self.lock_state();
        if state.closed {
            return Err(Error::Closed);
        }
        state.session.record_activity(now, &page);
        Ok(())
    }

    fn enqueue<F>(&self, kind: ObservationKind, page: &PageContext, make: F) -> Result<()>
    where
        F: FnOnce(i64) -> QueuedEvent,
    {
        let should_flush = {
            let mut state = self.lock_state();
            if state.closed {
                return Err(Error::Closed);
            }

            if !state.sampler.admit() {
                tracing::trace!(kind = kind.as_str(), "Observation sampled out");
                return Ok(());
            }

            let now = self.inner.clock.now();
            state.session.record_observation(kind, now, page);
            let timestamp = state.queue.next_timestamp(now);
            let len = state.queue.push(make(timestamp));

            tracing::trace!(kind = kind.as_str(), queued = len, "Observation queued");
            !state.manual_flush && len >= self.inner.config.batch_size
        };

        if should_flush {
            self.spawn_flush();
        }
        Ok(())
    }

    // ============================================
    // Delivery
    // ============================================

    /// Flush the queue and wait for the collector's answer
    pub async fn flush_events(&self) -> Result<()> {
        if self.lock_state().closed {
            return Err(Error::Closed);
        }
        self.flush(false).await;
        Ok(())
    }

    /// Attempt one delivery
    ///
    /// Guards, in order: a cleaned-up tracker, offline (unless unloading),
    /// a batch already in flight, an empty queue. An unloading flush uses the
    /// beacon transport and returns without waiting; its batch is dropped if
    /// it fails.
    pub async fn flush(&self, is_unloading: bool) -> FlushOutcome {
        if is_unloading {
            if self.lock_state().closed {
                return FlushOutcome::Skipped(SkipReason::Closed);
            }
            return self.flush_unloading();
        }

        let (_in_flight, batch) = {
            let mut state = self.lock_state();
            if state.closed {
                return FlushOutcome::Skipped(SkipReason::Closed);
            }
            if !state.connectivity.is_online() {
                return FlushOutcome::Skipped(SkipReason::Offline);
            }
            let Some(guard) = self.inner.delivery.begin() else {
                return FlushOutcome::Skipped(SkipReason::InFlight);
            };
            if state.queue.is_empty() {
                return FlushOutcome::Skipped(SkipReason::Empty);
            }
            let events = state.queue.take_all();
            (guard, self.build_batch(&state, events))
        };

        let events = batch.events.len();
        let result = self.inner.delivery.send(&batch).await;
        match result {
            Ok(()) => FlushOutcome::Sent { events },
            Err(_) => {
                self.lock_state().queue.prepend(batch.events);
                FlushOutcome::Requeued { events }
            }
        }
    }

    fn flush_unloading(&self) -> FlushOutcome {
        let mut state = self.lock_state();
        let Some(_in_flight) = self.inner.delivery.begin() else {
            return FlushOutcome::Skipped(SkipReason::InFlight);
        };
        if state.queue.is_empty() {
            return FlushOutcome::Skipped(SkipReason::Empty);
        }

        let events = state.queue.take_all();
        let batch = self.build_batch(&state, events);
        drop(state);

        let count = batch.events.len();
        let queued = self.inner.delivery.send_beacon(batch);
        FlushOutcome::Dispatched {
            events: count,
            queued,
        }
    }

    fn build_batch(&self, state: &State, events: Vec<QueuedEvent>) -> BatchPayload {
        let now = self.inner.clock.now().timestamp_millis();
        BatchPayload::new(
            &self.inner.config.site_id,
            &self.inner.user_id,
            &state.session.current().id,
            now,
            events,
            &self.inner.environment.page(),
        )
    }

    fn spawn_flush(&self) {
        let tracker = self.clone();
        self.inner.runtime.spawn(async move {
            tracker.flush(false).await;
        });
    }

    // ============================================
    // Mode, connectivity and session signals
    // ============================================

    /// Switch between manual and auto flushing
    ///
    /// Entering auto mode installs the flush timer and flushes right away if
    /// anything is queued; entering manual mode removes the timer.
    pub fn set_manual_flush(&self, manual: bool) -> Result<()> {
        let has_pending = {
            let mut state = self.lock_state();
            if state.closed {
                return Err(Error::Closed);
            }
            if state.manual_flush == manual {
                return Ok(());
            }
            state.manual_flush = manual;
            !state.queue.is_empty()
        };

        tracing::debug!(manual, "Flush mode changed");
        if manual {
            self.lock_scheduler().stop_flush_timer();
        } else {
            self.start_flush_timer();
            if has_pending {
                self.spawn_flush();
            }
        }
        Ok(())
    }

    /// Feed a host network signal
    pub fn set_online(&self, online: bool) {
        let restored = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.connectivity.update(online) == Transition::Restored && !state.manual_flush
        };
        if restored {
            self.spawn_flush();
        }
    }

    /// Rotate the session if it has expired
    pub fn check_session(&self) {
        let now = self.inner.clock.now();
        let page = self.inner.environment.page();
        let mut state = self.lock_state();
        if !state.closed {
            state.session.refresh_if_expired(now, &page);
        }
    }

    // ============================================
    // Inspection
    // ============================================

    /// Point-in-time copy of the queue and delivery state
    pub fn queue_status(&self) -> QueueStatus {
        let state = self.lock_state();
        QueueStatus {
            queue_length: state.queue.len(),
            events: state.queue.snapshot(),
            is_online: state.connectivity.is_online(),
            manual_flush: state.manual_flush,
            flush_in_flight: self.inner.delivery.is_in_flight(),
            sampled_out: state.sampler.rejected(),
            delivery: self.inner.delivery.stats(),
        }
    }

    /// Copy of the current session record
    pub fn session(&self) -> Session {
        self.lock_state().session.current().clone()
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Durable store this tracker writes to
    pub fn store(&self) -> Arc<dyn Store> {
        self.inner.store.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    // ============================================
    // Teardown
    // ============================================

    /// Send a final unloading batch, cancel both timers and go inert
    ///
    /// Calling it again is a no-op.
    pub fn cleanup(&self) -> FlushOutcome {
        if self.lock_state().closed {
            return FlushOutcome::Skipped(SkipReason::Closed);
        }

        let outcome = self.flush_unloading();
        self.lock_scheduler().cancel_all();
        self.lock_state().closed = true;

        tracing::info!(outcome = ?outcome, "Tracker cleaned up");
        outcome
    }

    // ============================================
    // Internals
    // ============================================

    fn start_flush_timer(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.flush_interval();
        self.lock_scheduler()
            .start_flush_timer(&self.inner.runtime, period, move || {
                // Stopping the timer must never cancel a send
                let Some(tracker) = upgrade(&weak) else {
                    return false;
                };
                tracker.spawn_flush();
                true
            });
    }

    fn start_session_timer(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.session_check_interval();
        self.lock_scheduler()
            .start_session_timer(&self.inner.runtime, period, move || {
                let Some(tracker) = upgrade(&weak) else {
                    return false;
                };
                tracker.check_session();
                true
            });
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_scheduler(&self) -> MutexGuard<'_, FlushScheduler> {
        self.inner.scheduler.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<Tracker> {
    weak.upgrade().map(|inner| Tracker { inner })
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("site_id", &self.inner.config.site_id)
            .field("user_id", &self.inner.user_id)
            .finish_non_exhaustive()
    }
}
