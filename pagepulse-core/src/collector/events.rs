//! Collector wire format
//!
//! ```text
//! { siteId, userId, sessionId, timestamp, events: [...], commonParams: {...} }
//! ```
//!
//! `commonParams` describes the page at send time, not at enqueue time.

use serde::{Deserialize, Serialize};

use crate::environment::PageContext;
use crate::types::QueuedEvent;

/// Library name reported in `commonParams`
pub const LIBRARY_NAME: &str = env!("CARGO_PKG_NAME");

/// Library version reported in `commonParams`
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Body of a batch request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    pub site_id: String,
    pub user_id: String,
    pub session_id: String,
    /// Client send time, epoch milliseconds
    pub timestamp: i64,
    pub events: Vec<QueuedEvent>,
    pub common_params: CommonParams,
}

/// Page and client details attached to every batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonParams {
    pub site_id: String,
    pub timestamp: i64,
    pub screen_width: u32,
    pub screen_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub language: String,
    pub library: String,
    pub library_version: String,
    pub user_id: String,
    pub session_id: String,
    pub path: String,
    pub referrer: String,
    pub domain: String,
    pub protocol: String,
    pub title: String,
}

impl BatchPayload {
    /// Assemble a batch, collecting page details from `page`
    pub fn new(
        site_id: &str,
        user_id: &str,
        session_id: &str,
        timestamp: i64,
        events: Vec<QueuedEvent>,
        page: &PageContext,
    ) -> Self {
        let common_params = CommonParams {
            site_id: site_id.to_string(),
            timestamp,
            screen_width: page.screen_width,
            screen_height: page.screen_height,
            viewport_width: page.viewport_width,
            viewport_height: page.viewport_height,
            language: page.locale.clone(),
            library: LIBRARY_NAME.to_string(),
            library_version: LIBRARY_VERSION.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            path: page.path.clone(),
            referrer: page.referrer.clone(),
            domain: page.domain.clone(),
            protocol: page.protocol.clone(),
            title: page.title.clone(),
        };

        Self {
            site_id: site_id.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            timestamp,
            events,
            common_params,
        }
    }
}
