//! # pagepulse-core
//!
//! Client-side analytics tracker: records pageviews and custom events,
//! groups them into sessions, buffers them in a durable queue and delivers
//! them to a collector in batches.
//!
//! ## Pipeline
//!
//! An observation passes the sampling gate, bumps the session counters,
//! gets a monotonic timestamp and is appended to the queue (mirrored to the
//! store when offline tracking is on). Flushes take the whole queue as one
//! batch; a failed batch goes back in front of anything queued meanwhile.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pagepulse_core::{EventOptions, PageviewOptions, Tracker, TrackerConfig};
//!
//! # async fn run() -> pagepulse_core::Result<()> {
//! let tracker = Tracker::builder(TrackerConfig::new("my-site")).build()?;
//!
//! tracker.track_pageview(PageviewOptions::path("/pricing"))?;
//! tracker.track_event(EventOptions::new("signup").category("funnel"))?;
//! tracker.flush_events().await?;
//!
//! tracker.cleanup();
//! # Ok(())
//! # }
//! ```

pub use collector::{BatchPayload, CommonParams, HttpTransport, Transport};
pub use config::{Config, LoggingConfig, TrackerConfig};
pub use delivery::{FlushOutcome, SkipReason};
pub use environment::{
    Clock, HostEnvironment, ManualClock, PageContext, StaticEnvironment, SystemClock,
};
pub use error::{Error, Result};
pub use session::Session;
pub use store::{MemoryStore, SqliteStore, Store};
pub use tracker::{Tracker, TrackerBuilder};
pub use types::*;

pub mod collector;
pub mod config;
pub mod connectivity;
pub mod delivery;
pub mod environment;
pub mod error;
pub mod facade;
pub mod identity;
pub mod logging;
pub mod queue;
pub mod sampling;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod tracker;
pub mod types;
