//! Durable key/value storage for tracker state
//!
//! Three keys are written, each holding a JSON string:
//! - [`USER_ID_KEY`]: the anonymous user id
//! - [`SESSION_KEY`]: the current session record
//! - [`QUEUE_KEY`]: a full mirror of the pending event queue
//!
//! The tracker treats every store failure as non-fatal, so implementations
//! are free to return errors whenever the backing medium is unavailable.

pub mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Key holding the anonymous user id
pub const USER_ID_KEY: &str = "pagepulse_user_id";

/// Key holding the serialized session record
pub const SESSION_KEY: &str = "pagepulse_session";

/// Key holding the serialized queue mirror
pub const QUEUE_KEY: &str = "pagepulse_event_queue";

/// String key/value storage that survives restarts
pub trait Store: Send + Sync {
    /// Read a value, `None` if the key was never written
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value (no-op if missing)
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

/// Store for hosts where storage is disabled; every call fails
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStore;

impl DisabledStore {
    fn unavailable() -> Error {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "storage is disabled",
        ))
    }
}

impl Store for DisabledStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Self::unavailable())
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Self::unavailable())
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Err(Self::unavailable())
    }
}
