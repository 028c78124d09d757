//! Process-wide tracker
//!
//! Thin free functions over one global [`Tracker`] slot, for hosts that
//! want a single tracker without threading a handle around.

use std::sync::{Mutex, MutexGuard};

use crate::config::TrackerConfig;
use crate::delivery::FlushOutcome;
use crate::error::{Error, Result};
use crate::tracker::{Tracker, TrackerBuilder};
use crate::types::{EventOptions, PageviewOptions, QueueStatus};

static TRACKER: Mutex<Option<Tracker>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<Tracker>> {
    TRACKER.lock().unwrap_or_else(|e| e.into_inner())
}

fn current() -> Result<Tracker> {
    slot().clone().ok_or(Error::NotInitialized)
}

/// Create the global tracker with default collaborators
pub fn init(config: TrackerConfig) -> Result<Tracker> {
    init_with(Tracker::builder(config))
}

/// Create the global tracker from a prepared builder
pub fn init_with(builder: TrackerBuilder) -> Result<Tracker> {
    let mut slot = slot();
    if slot.is_some() {
        return Err(Error::AlreadyInitialized);
    }
    let tracker = builder.build()?;
    *slot = Some(tracker.clone());
    Ok(tracker)
}

pub fn track_pageview(opts: PageviewOptions) -> Result<()> {
    current()?.track_pageview(opts)
}

pub fn track_event(opts: EventOptions) -> Result<()> {
    current()?.track_event(opts)
}

pub async fn flush_events() -> Result<()> {
    let tracker = current()?;
    tracker.flush_events().await
}

pub fn set_manual_flush(manual: bool) -> Result<()> {
    current()?.set_manual_flush(manual)
}

pub fn get_queue_status() -> Result<QueueStatus> {
    Ok(current()?.queue_status())
}

/// Tear down the global tracker; `init` may be called again afterwards
pub fn cleanup() -> Result<FlushOutcome> {
    let tracker = slot().take().ok_or(Error::NotInitialized)?;
    Ok(tracker.cleanup())
}

/// Whether a global tracker is installed
pub fn is_initialized() -> bool {
    slot().is_some()
}
