//! Ordered event queue with a durable mirror
//!
//! Insertion order is delivery order. When offline persistence is enabled
//! every mutation overwrites the mirror under [`QUEUE_KEY`] with the full
//! buffer; the mirror is a copy, never a log.

use crate::store::{Store, QUEUE_KEY};
use crate::types::QueuedEvent;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

pub struct EventQueue {
    events: Vec<QueuedEvent>,
    store: Arc<dyn Store>,
    persist: bool,
    debug: bool,
    last_timestamp: i64,
}

impl EventQueue {
    /// Queue without a durable mirror
    ///
    /// A mirror left behind by an earlier run with offline tracking on is
    /// deleted rather than restored.
    pub fn in_memory(store: Arc<dyn Store>, debug: bool) -> Self {
        if let Err(e) = store.remove(QUEUE_KEY) {
            if debug {
                tracing::warn!(error = %e, "Failed to discard stale queue mirror");
            }
        }
        Self {
            events: Vec::new(),
            store,
            persist: false,
            debug,
            last_timestamp: 0,
        }
    }

    /// Queue restored from the durable mirror
    ///
    /// A missing, corrupt, or non-array mirror yields an empty queue. Array
    /// entries that no longer decode are skipped.
    pub fn rehydrate(store: Arc<dyn Store>, debug: bool) -> Self {
        let events = match store.get(QUEUE_KEY) {
            Ok(Some(raw)) => decode_mirror(&raw, debug),
            Ok(None) => Vec::new(),
            Err(e) => {
                if debug {
                    tracing::warn!(error = %e, "Failed to read queue mirror");
                }
                Vec::new()
            }
        };

        if !events.is_empty() {
            tracing::info!(count = events.len(), "Restored queued events");
        }

        let last_timestamp = events.iter().map(QueuedEvent::timestamp).max().unwrap_or(0);
        Self {
            events,
            store,
            persist: true,
            debug,
            last_timestamp,
        }
    }

    /// Ingestion timestamp for the next observation
    ///
    /// Never lower than a timestamp already handed out, so queue order and
    /// timestamp order agree even if the wall clock steps back.
    pub fn next_timestamp(&mut self, now: DateTime<Utc>) -> i64 {
        let ts = now.timestamp_millis().max(self.last_timestamp);
        self.last_timestamp = ts;
        ts
    }

    /// Append and mirror. Returns the new length.
    pub fn push(&mut self, event: QueuedEvent) -> usize {
        self.events.push(event);
        self.persist();
        self.events.len()
    }

    /// Take the whole buffer, leaving a fresh empty one behind
    ///
    /// The mirror is emptied immediately, before the batch is confirmed.
    pub fn take_all(&mut self) -> Vec<QueuedEvent> {
        let batch = std::mem::take(&mut self.events);
        self.persist();
        batch
    }

    /// Put a failed batch back in front of anything queued since
    pub fn prepend(&mut self, mut batch: Vec<QueuedEvent>) {
        batch.append(&mut self.events);
        self.events = batch;
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Copy of the queued events
    pub fn snapshot(&self) -> Vec<QueuedEvent> {
        self.events.clone()
    }

    fn persist(&self) {
        if !self.persist {
            return;
        }
        let result = serde_json::to_string(&self.events)
            .map_err(crate::error::Error::from)
            .and_then(|raw| self.store.set(QUEUE_KEY, &raw));
        if let Err(e) = result {
            if self.debug {
                tracing::warn!(error = %e, count = self.events.len(), "Failed to persist queue");
            }
        }
    }
}

fn decode_mirror(raw: &str, debug: bool) -> Vec<QueuedEvent> {
    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            if debug {
                tracing::warn!("Queue mirror is not an array, ignoring it");
            }
            return Vec::new();
        }
        Err(e) => {
            if debug {
                tracing::warn!(error = %e, "Queue mirror is corrupt, ignoring it");
            }
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<QueuedEvent>(item) {
            Ok(event) => Some(event),
            Err(e) => {
                if debug {
                    tracing::warn!(error = %e, "Skipping undecodable queued event");
                }
                None
            }
        })
        .collect()
}
