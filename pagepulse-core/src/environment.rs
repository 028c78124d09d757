//! Host environment and clock seams
//!
//! The tracker never inspects the host directly. Page context, network
//! status, and wall-clock time are read through the traits here so that
//! browsers-in-a-webview, CLIs and tests can all plug in their own source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

/// Snapshot of the page the host is currently showing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageContext {
    /// Current path, e.g. `/pricing`
    pub path: String,
    /// Referrer of the current document (empty when none)
    pub referrer: String,
    /// Document title
    pub title: String,
    /// Host name
    pub domain: String,
    /// Scheme, e.g. `https:`
    pub protocol: String,
    /// BCP 47 locale tag
    pub locale: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for PageContext {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            referrer: String::new(),
            title: String::new(),
            domain: "localhost".to_string(),
            protocol: "https:".to_string(),
            locale: "en-US".to_string(),
            screen_width: 0,
            screen_height: 0,
            viewport_width: 0,
            viewport_height: 0,
        }
    }
}

/// Source of page context and network status
pub trait HostEnvironment: Send + Sync {
    /// Current page context, read fresh on every call
    fn page(&self) -> PageContext;

    /// Platform network-status signal
    fn is_online(&self) -> bool {
        true
    }
}

/// Host environment backed by values the embedder sets explicitly
#[derive(Debug)]
pub struct StaticEnvironment {
    page: RwLock<PageContext>,
    online: AtomicBool,
}

impl StaticEnvironment {
    pub fn new(page: PageContext) -> Self {
        Self {
            page: RwLock::new(page),
            online: AtomicBool::new(true),
        }
    }

    /// Replace the whole page context
    pub fn set_page(&self, page: PageContext) {
        if let Ok(mut current) = self.page.write() {
            *current = page;
        }
    }

    /// Navigate to a new path, keeping the rest of the context
    pub fn set_path(&self, path: impl Into<String>) {
        if let Ok(mut current) = self.page.write() {
            current.path = path.into();
        }
    }

    /// Update the reported network status
    ///
    /// This only changes what `is_online` reports; the tracker learns about
    /// transitions through `Tracker::set_online`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for StaticEnvironment {
    fn default() -> Self {
        Self::new(PageContext::default())
    }
}

impl HostEnvironment for StaticEnvironment {
    fn page(&self) -> PageContext {
        self.page
            .read()
            .map(|page| page.clone())
            .unwrap_or_default()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Wall-clock source
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward (or backward, for a negative duration)
    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}
