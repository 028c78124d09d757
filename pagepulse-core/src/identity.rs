//! Anonymous user identity
//!
//! The user id is created once per device profile and reused by every later
//! tracker. Storage problems never surface to the caller: the id still works
//! for the current process, it just will not survive a restart.

use crate::store::{Store, USER_ID_KEY};
use uuid::Uuid;

/// Resolve the persisted user id, creating and persisting one if needed
pub fn resolve_user_id(store: &dyn Store, debug: bool) -> String {
    match store.get(USER_ID_KEY) {
        Ok(Some(id)) if !id.trim().is_empty() => return id,
        Ok(_) => {}
        Err(e) => {
            if debug {
                tracing::warn!(error = %e, "Failed to read user id, generating a new one");
            }
        }
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = store.set(USER_ID_KEY, &id) {
        if debug {
            tracing::warn!(error = %e, "Failed to persist user id");
        }
    }
    id
}
