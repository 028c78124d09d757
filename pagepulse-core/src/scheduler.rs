//! Recurring tracker timers
//!
//! The tracker owns two timers: the auto-mode flush timer and the session
//! expiry check. Both are tokio tasks held here so they can be torn down
//! individually (switching to manual mode) or together (cleanup, drop).
//!
//! Ticks are synchronous. Work that awaits (a flush) must be spawned by the
//! tick as its own task, so aborting a timer never cancels a send.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Default)]
pub struct FlushScheduler {
    flush_timer: Option<JoinHandle<()>>,
    session_timer: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the flush timer, replacing any existing one
    pub fn start_flush_timer<F>(&mut self, runtime: &Handle, period: Duration, tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.stop_flush_timer();
        self.flush_timer = Some(spawn_every(runtime, period, tick));
    }

    /// Tear down the flush timer (manual mode)
    pub fn stop_flush_timer(&mut self) {
        if let Some(handle) = self.flush_timer.take() {
            handle.abort();
        }
    }

    pub fn has_flush_timer(&self) -> bool {
        self.flush_timer.is_some()
    }

    /// Install the session expiry check, replacing any existing one
    pub fn start_session_timer<F>(&mut self, runtime: &Handle, period: Duration, tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if let Some(handle) = self.session_timer.take() {
            handle.abort();
        }
        self.session_timer = Some(spawn_every(runtime, period, tick));
    }

    pub fn has_session_timer(&self) -> bool {
        self.session_timer.is_some()
    }

    /// Cancel both timers
    pub fn cancel_all(&mut self) {
        self.stop_flush_timer();
        if let Some(handle) = self.session_timer.take() {
            handle.abort();
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Run `tick` every `period`, starting one period from now
///
/// `tick` returns `false` once its target is gone, which ends the task.
fn spawn_every<F>(runtime: &Handle, period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    runtime.spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip first immediate tick
        interval.tick().await;

        loop {
            interval.tick().await;
            if !tick() {
                break;
            }
        }
    })
}
