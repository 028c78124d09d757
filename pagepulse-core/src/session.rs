//! Rolling session lifecycle
//!
//! A session lives until `now - last_activity` exceeds the configured
//! timeout. Expiry is checked lazily whenever the session is touched, at
//! construction, and by a recurring timer owned by the tracker. An expired
//! session is never mutated again; it is replaced by a fresh record.

use crate::environment::PageContext;
use crate::store::{Store, SESSION_KEY};
use crate::types::ObservationKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Persisted session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub start_time: DateTime<Utc>,
    /// Invariant: never earlier than `start_time`
    pub last_activity: DateTime<Utc>,
    pub pageview_count: u64,
    pub event_count: u64,
    pub initial_referrer: String,
    pub initial_landing_page: String,
}

impl Session {
    /// Fresh session stamped with `now` and the current page
    pub fn new(now: DateTime<Utc>, page: &PageContext) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start_time: now,
            last_activity: now,
            pageview_count: 0,
            event_count: 0,
            initial_referrer: page.referrer.clone(),
            initial_landing_page: page.path.clone(),
        }
    }

    /// True once the inactivity window has been exceeded
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now - self.last_activity > timeout
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = self.last_activity.max(now);
    }
}

/// Owns the current session and keeps its durable copy up to date
pub struct SessionManager {
    session: Session,
    timeout: chrono::Duration,
    store: Arc<dyn Store>,
    debug: bool,
}

impl SessionManager {
    /// Resume the persisted session if it is still live, otherwise start a new one
    pub fn start(
        store: Arc<dyn Store>,
        timeout: chrono::Duration,
        debug: bool,
        now: DateTime<Utc>,
        page: &PageContext,
    ) -> Self {
        let restored = match store.get(SESSION_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Session>(&raw) {
                Ok(session) => Some(session),
                Err(e) => {
                    if debug {
                        tracing::warn!(error = %e, "Discarding corrupt session record");
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                if debug {
                    tracing::warn!(error = %e, "Failed to read session record");
                }
                None
            }
        };

        let (session, resumed) = match restored {
            Some(session) if !session.is_expired(now, timeout) => (session, true),
            _ => (Session::new(now, page), false),
        };

        tracing::debug!(session_id = %session.id, resumed, "Session started");

        let manager = Self {
            session,
            timeout,
            store,
            debug,
        };
        if !resumed {
            manager.persist();
        }
        manager
    }

    /// The current session record
    pub fn current(&self) -> &Session {
        &self.session
    }

    /// Replace the session if it has expired. Returns true on rotation.
    pub fn refresh_if_expired(&mut self, now: DateTime<Utc>, page: &PageContext) -> bool {
        if !self.session.is_expired(now, self.timeout) {
            return false;
        }

        let previous = std::mem::replace(&mut self.session, Session::new(now, page));
        tracing::debug!(
            previous = %previous.id,
            session_id = %self.session.id,
            "Session expired, started a new one"
        );
        self.persist();
        true
    }

    /// Count an admitted observation against the (possibly fresh) session
    pub fn record_observation(
        &mut self,
        kind: ObservationKind,
        now: DateTime<Utc>,
        page: &PageContext,
    ) {
        self.refresh_if_expired(now, page);
        match kind {
            ObservationKind::Pageview => self.session.pageview_count += 1,
            ObservationKind::Event => self.session.event_count += 1,
        }
        self.session.touch(now);
        self.persist();
    }

    /// Activity signal: keep the session alive without counting anything
    pub fn record_activity(&mut self, now: DateTime<Utc>, page: &PageContext) {
        self.refresh_if_expired(now, page);
        self.session.touch(now);
        self.persist();
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.session)
            .map_err(crate::error::Error::from)
            .and_then(|raw| self.store.set(SESSION_KEY, &raw));
        if let Err(e) = result {
            if self.debug {
                tracing::warn!(error = %e, "Failed to persist session");
            }
        }
    }
}
