//! Delivery engine
//!
//! Wraps a [`Transport`] with the at-most-one-in-flight guard and delivery
//! statistics. Queue handling around a send (snapshot, re-queue) belongs to
//! the tracker, which owns the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::collector::{BatchPayload, Transport};
use crate::error::Result;
use crate::types::DeliveryStats;

/// Why a flush did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Host is offline and this is not an unloading flush
    Offline,
    /// Another batch is still being sent
    InFlight,
    /// Nothing queued
    Empty,
    /// The tracker was cleaned up
    Closed,
}

/// What a flush attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Skipped(SkipReason),
    /// The collector accepted the batch
    Sent { events: usize },
    /// The send failed and the batch went back to the front of the queue
    Requeued { events: usize },
    /// Unloading batch handed to the beacon transport; `queued` is false
    /// when the transport refused it
    Dispatched { events: usize, queued: bool },
}

/// Sends batches, one at a time
pub struct DeliveryEngine {
    transport: Arc<dyn Transport>,
    in_flight: AtomicBool,
    stats: Mutex<DeliveryStats>,
}

/// Holds the in-flight flag; clears it when dropped, on every exit path
#[must_use]
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl DeliveryEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            in_flight: AtomicBool::new(false),
            stats: Mutex::new(DeliveryStats::default()),
        }
    }

    /// Claim the in-flight slot, `None` if a batch is already out
    pub fn begin(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlightGuard {
                flag: &self.in_flight,
            })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Send a batch and wait for the collector
    pub async fn send(&self, batch: &BatchPayload) -> Result<()> {
        let count = batch.events.len() as u64;
        match self.transport.send_batch(batch).await {
            Ok(()) => {
                let mut stats = self.stats_mut();
                stats.batches_sent += 1;
                stats.events_sent += count;
                tracing::debug!(
                    session_id = %batch.session_id,
                    events = count,
                    "Delivered batch"
                );
                Ok(())
            }
            Err(e) => {
                self.stats_mut().failed_attempts += 1;
                tracing::warn!(
                    session_id = %batch.session_id,
                    events = count,
                    error = %e,
                    "Failed to deliver batch"
                );
                Err(e)
            }
        }
    }

    /// Fire-and-forget send for unloading flushes
    pub fn send_beacon(&self, batch: BatchPayload) -> bool {
        let count = batch.events.len();
        let queued = self.transport.send_beacon(batch);
        if queued {
            self.stats_mut().beacons_dispatched += 1;
        }
        tracing::debug!(events = count, queued, "Dispatched unload batch");
        queued
    }

    /// Copy of the delivery counters
    pub fn stats(&self) -> DeliveryStats {
        self.stats_mut().clone()
    }

    fn stats_mut(&self) -> std::sync::MutexGuard<'_, DeliveryStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}
