//! Collector transport
//!
//! Batches leave the tracker through a [`Transport`]. Two delivery modes
//! exist:
//! - **Awaited** (`send_batch`): the tracker waits for the collector's
//!   answer and re-queues the batch on failure.
//! - **Beacon** (`send_beacon`): used while the host is tearing down. The
//!   request is handed off and never awaited, so nothing can be re-queued.
//!
//! ## Configuration
//!
//! ```toml
//! [tracker]
//! site_id = "my-site"
//! event_endpoint = "https://collect.example.com/api/event"
//! # batch_endpoint defaults to "<event_endpoint>/batch"
//! ```

mod client;
mod events;

pub use client::HttpTransport;
pub use events::{BatchPayload, CommonParams, LIBRARY_NAME, LIBRARY_VERSION};

use crate::error::Result;
use async_trait::async_trait;

/// Delivers batches to the collector
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one batch and wait for the collector's verdict
    ///
    /// Any error (network failure or non-success status) means the batch
    /// was not accepted.
    async fn send_batch(&self, batch: &BatchPayload) -> Result<()>;

    /// Hand a batch off without waiting for completion
    ///
    /// Returns whether the request was queued for sending.
    fn send_beacon(&self, batch: BatchPayload) -> bool;
}
