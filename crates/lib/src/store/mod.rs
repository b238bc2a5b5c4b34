//! Seams to the external stores the verification protocol runs against.
//!
//! Both traits are synchronous: every call is one round trip to the
//! backing store. Callers wrap them in request-level timeouts.

use std::collections::HashMap;
use std::time::Duration;

pub mod memory;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("value {value:?} under {key:?} is not what was stored")]
    Corrupt { key: String, value: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Key/value store with a per-key expiry.
pub trait EphemeralStore {
    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// `Ok(None)` when the key is missing or has expired.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Remove `key`, returning whether a live entry was actually removed.
    ///
    /// Of several concurrent deletes of the same key at most one sees `true`.
    fn delete(&self, key: &str) -> StoreResult<bool>;
}

/// Hash of fields per session id, expiring as a whole.
pub trait SessionStore {
    /// Set one field and (re)arm the session expiry.
    fn set_field(&self, session_id: &str, field: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    fn get_field(&self, session_id: &str, field: &str) -> StoreResult<Option<String>>;

    /// Atomically add `delta` to a numeric field and return the new value.
    ///
    /// A missing field counts as zero.
    fn increment_field(&self, session_id: &str, field: &str, delta: i64) -> StoreResult<i64>;

    fn delete_field(&self, session_id: &str, field: &str) -> StoreResult<()>;

    /// Replace the given fields and (re)arm the session expiry.
    fn save(&self, session_id: &str, fields: &HashMap<String, String>, ttl: Duration) -> StoreResult<()>;

    fn get_all(&self, session_id: &str) -> StoreResult<HashMap<String, String>>;

    /// Drop the whole session.
    fn delete(&self, session_id: &str) -> StoreResult<()>;
}

/// Key under which a session's fields live.
pub fn session_key(session_id: &str) -> String {
    format!("sid_{session_id}")
}

impl<T: EphemeralStore + ?Sized> EphemeralStore for &T {
    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        (**self).set_with_ttl(key, value, ttl)
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        (**self).delete(key)
    }
}

impl<T: SessionStore + ?Sized> SessionStore for &T {
    fn set_field(&self, session_id: &str, field: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        (**self).set_field(session_id, field, value, ttl)
    }

    fn get_field(&self, session_id: &str, field: &str) -> StoreResult<Option<String>> {
        (**self).get_field(session_id, field)
    }

    fn increment_field(&self, session_id: &str, field: &str, delta: i64) -> StoreResult<i64> {
        (**self).increment_field(session_id, field, delta)
    }

    fn delete_field(&self, session_id: &str, field: &str) -> StoreResult<()> {
        (**self).delete_field(session_id, field)
    }

    fn save(&self, session_id: &str, fields: &HashMap<String, String>, ttl: Duration) -> StoreResult<()> {
        (**self).save(session_id, fields, ttl)
    }

    fn get_all(&self, session_id: &str) -> StoreResult<HashMap<String, String>> {
        (**self).get_all(session_id)
    }

    fn delete(&self, session_id: &str) -> StoreResult<()> {
        (**self).delete(session_id)
    }
}
