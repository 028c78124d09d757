//! Shared fixtures for tracker integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pagepulse_core::{
    BatchPayload, Error, ManualClock, MemoryStore, PageContext, QueuedEvent, Result,
    StaticEnvironment, Store, Tracker, TrackerConfig, Transport,
};
use tokio::sync::Semaphore;

/// Transport that records batches and can be told to fail or to block
#[derive(Default)]
pub struct MockTransport {
    attempts: Mutex<Vec<BatchPayload>>,
    delivered: Mutex<Vec<BatchPayload>>,
    beacons: Mutex<Vec<BatchPayload>>,
    fail: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Block every `send_batch` until [`MockTransport::release`]
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let held sends through and stop holding new ones
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn delivered(&self) -> Vec<BatchPayload> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn beacons(&self) -> Vec<BatchPayload> {
        self.beacons.lock().unwrap().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_batch(&self, batch: &BatchPayload) -> Result<()> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.attempts.lock().unwrap().push(batch.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Delivery("API error (500): unavailable".to_string()));
        }
        self.delivered.lock().unwrap().push(batch.clone());
        Ok(())
    }

    fn send_beacon(&self, batch: BatchPayload) -> bool {
        self.beacons.lock().unwrap().push(batch);
        true
    }
}

/// A tracker wired to in-process collaborators
pub struct Harness {
    pub tracker: Tracker,
    pub transport: Arc<MockTransport>,
    pub environment: Arc<StaticEnvironment>,
    pub clock: Arc<ManualClock>,
}

pub fn config(site_id: &str) -> TrackerConfig {
    TrackerConfig {
        batch_size: 10,
        flush_interval_ms: 600_000,
        ..TrackerConfig::new(site_id)
    }
}

pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn page(path: &str) -> PageContext {
    PageContext {
        path: path.to_string(),
        title: "Test page".to_string(),
        domain: "shop.example.com".to_string(),
        ..PageContext::default()
    }
}

pub fn harness(config: TrackerConfig) -> Harness {
    harness_with_store(config, Arc::new(MemoryStore::new()), true)
}

pub fn harness_with_store(config: TrackerConfig, store: Arc<dyn Store>, online: bool) -> Harness {
    let transport = MockTransport::new();
    let environment = Arc::new(StaticEnvironment::new(page("/home")));
    environment.set_online(online);
    let clock = Arc::new(ManualClock::new(start_time()));

    let tracker = Tracker::builder(config)
        .store(store)
        .transport(transport.clone())
        .environment(environment.clone())
        .clock(clock.clone())
        .build()
        .expect("tracker should build");

    Harness {
        tracker,
        transport,
        environment,
        clock,
    }
}

/// Poll `condition` while yielding to spawned tasks
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Event names or pageview paths, in order
pub fn labels(events: &[QueuedEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event {
            QueuedEvent::Pageview(pv) => pv.path.clone(),
            QueuedEvent::Event(ev) => ev.event_name.clone(),
        })
        .collect()
}
