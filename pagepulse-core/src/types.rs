//! Core domain types for pagepulse
//!
//! These types represent the observations producers submit, the form they
//! take while waiting in the queue, and the read-only status snapshot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================
// Producer-facing options
// ============================================

/// Options for `track_pageview`
///
/// Every field left as `None` is filled from the host's current page
/// context at enqueue time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageviewOptions {
    pub path: Option<String>,
    pub content_type: Option<String>,
    pub referrer: Option<String>,
    pub language: Option<String>,
    pub title: Option<String>,
    /// Marks a pageview produced without a real navigation (SPA route, modal)
    pub is_virtual: bool,
}

impl PageviewOptions {
    /// Pageview for an explicit path
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Mark as a virtual pageview
    pub fn virtual_pageview(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Options for `track_event`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOptions {
    /// Event name (required, must not be blank)
    pub event_name: String,
    pub event_category: Option<String>,
    pub event_label: Option<String>,
    pub event_value: Option<f64>,
    pub properties: Option<Map<String, Value>>,
}

impl EventOptions {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.event_category = Some(category.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.event_label = Some(label.into());
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.event_value = Some(value);
        self
    }

    /// Attach one custom property
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

// ============================================
// Queued observations
// ============================================

/// A pageview as stored in the queue and sent to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageviewEvent {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    /// Ingestion time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// A custom event as stored in the queue and sent to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEvent {
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    /// Ingestion time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Observation waiting in the queue, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueuedEvent {
    Pageview(PageviewEvent),
    Event(CustomEvent),
}

impl QueuedEvent {
    /// Ingestion timestamp in epoch milliseconds
    pub fn timestamp(&self) -> i64 {
        match self {
            QueuedEvent::Pageview(pv) => pv.timestamp,
            QueuedEvent::Event(ev) => ev.timestamp,
        }
    }

    /// Which session counter this observation bumps
    pub fn kind(&self) -> ObservationKind {
        match self {
            QueuedEvent::Pageview(_) => ObservationKind::Pageview,
            QueuedEvent::Event(_) => ObservationKind::Event,
        }
    }
}

/// Kind of admitted observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationKind {
    Pageview,
    Event,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::Pageview => "pageview",
            ObservationKind::Event => "event",
        }
    }
}

// ============================================
// Status snapshot
// ============================================

/// Delivery counters since the tracker started
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    /// Batches the collector accepted
    pub batches_sent: u64,
    /// Events inside accepted batches
    pub events_sent: u64,
    /// Batch sends that failed and were re-queued
    pub failed_attempts: u64,
    /// Unloading batches handed to the beacon transport
    pub beacons_dispatched: u64,
}

/// Point-in-time copy of the tracker queue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_length: usize,
    pub events: Vec<QueuedEvent>,
    pub is_online: bool,
    pub manual_flush: bool,
    pub flush_in_flight: bool,
    /// Observations rejected by the sampler
    pub sampled_out: u64,
    pub delivery: DeliveryStats,
}
