//! In-memory implementation of both store traits.
//!
//! Suitable for development and tests: entries live in this process only.
//! Expiry is checked lazily against an injectable clock, so tests can move
//! time forward with [`ManualClock`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::store::{session_key, EphemeralStore, SessionStore, StoreError, StoreResult};

type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

struct Entry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Entry<T> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, Entry<String>>>>,
    sessions: Arc<RwLock<HashMap<String, Entry<HashMap<String, String>>>>>,
    clock: Clock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Instant::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let now = self.now();
        let mut values = write(&self.values)?;
        let mut sessions = write(&self.sessions)?;
        let before = values.len() + sessions.len();
        values.retain(|_, entry| entry.is_live(now));
        sessions.retain(|_, entry| entry.is_live(now));
        let removed = before - values.len() - sessions.len();
        debug!(removed, "purged expired entries");
        Ok(removed)
    }

    fn now(&self) -> Instant {
        (self.clock)()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
}

impl EphemeralStore for MemoryStore {
    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        // A TTL past the end of the clock never expires.
        let expires_at = self.now().checked_add(ttl);
        write(&self.values)?.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.now();
        let values = read(&self.values)?;
        Ok(values
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = self.now();
        let removed = write(&self.values)?.remove(key);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }
}

impl MemoryStore {
    // Live fields of a session, creating an unexpiring hash when absent.
    fn live_session<'a>(
        sessions: &'a mut HashMap<String, Entry<HashMap<String, String>>>,
        key: String,
        now: Instant,
    ) -> &'a mut Entry<HashMap<String, String>> {
        let entry = sessions.entry(key).or_insert_with(|| Entry {
            value: HashMap::new(),
            expires_at: None,
        });
        if !entry.is_live(now) {
            entry.value.clear();
            entry.expires_at = None;
        }
        entry
    }
}

impl SessionStore for MemoryStore {
    fn set_field(&self, session_id: &str, field: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let now = self.now();
        let mut sessions = write(&self.sessions)?;
        let entry = Self::live_session(&mut sessions, session_key(session_id), now);
        entry.value.insert(field.to_string(), value.to_string());
        entry.expires_at = now.checked_add(ttl);
        Ok(())
    }

    fn get_field(&self, session_id: &str, field: &str) -> StoreResult<Option<String>> {
        let now = self.now();
        let sessions = read(&self.sessions)?;
        Ok(sessions
            .get(&session_key(session_id))
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.value.get(field).cloned()))
    }

    fn increment_field(&self, session_id: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let now = self.now();
        let key = session_key(session_id);
        let mut sessions = write(&self.sessions)?;
        let entry = Self::live_session(&mut sessions, key.clone(), now);
        let current = match entry.value.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|_| StoreError::Corrupt {
                key: format!("{key}.{field}"),
                value: raw.clone(),
            })?,
            None => 0,
        };
        let next = current + delta;
        entry.value.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    fn delete_field(&self, session_id: &str, field: &str) -> StoreResult<()> {
        let key = session_key(session_id);
        let mut sessions = write(&self.sessions)?;
        if let Some(entry) = sessions.get_mut(&key) {
            entry.value.remove(field);
            if entry.value.is_empty() {
                sessions.remove(&key);
            }
        }
        Ok(())
    }

    fn save(&self, session_id: &str, fields: &HashMap<String, String>, ttl: Duration) -> StoreResult<()> {
        let now = self.now();
        let mut sessions = write(&self.sessions)?;
        let entry = Self::live_session(&mut sessions, session_key(session_id), now);
        entry
            .value
            .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        entry.expires_at = now.checked_add(ttl);
        Ok(())
    }

    fn get_all(&self, session_id: &str) -> StoreResult<HashMap<String, String>> {
        let now = self.now();
        let sessions = read(&self.sessions)?;
        Ok(sessions
            .get(&session_key(session_id))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
            .unwrap_or_default())
    }

    fn delete(&self, session_id: &str) -> StoreResult<()> {
        write(&self.sessions)?.remove(&session_key(session_id));
        Ok(())
    }
}

/// Clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    start: Instant,
    offset_millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        // The closure always returns Some, so the update cannot fail.
        let _ = self
            .offset_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |offset| {
                Some(offset.saturating_add(by))
            });
    }

    pub fn now(&self) -> Instant {
        self.start + Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
    }

    /// A [`MemoryStore`] driven by this clock.
    pub fn store(&self) -> MemoryStore {
        let clock = self.clone();
        MemoryStore::with_clock(Arc::new(move || clock.now()))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::store::memory::ManualClock;
    use crate::store::{EphemeralStore, SessionStore, StoreError};
    use crate::MemoryStore;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn it_expires_values_after_their_ttl() {
        let clock = ManualClock::new();
        let store = clock.store();
        store.set_with_ttl("a@b.com", "42", 5 * MINUTE).unwrap();

        clock.advance(4 * MINUTE);
        assert_eq!(store.get("a@b.com").unwrap(), Some("42".to_string()));

        clock.advance(MINUTE);
        assert_eq!(store.get("a@b.com").unwrap(), None);
    }

    #[test]
    fn it_keeps_values_whose_ttl_overflows_the_clock() {
        let clock = ManualClock::new();
        let store = clock.store();
        store.set_with_ttl("a@b.com", "42", Duration::MAX).unwrap();
        store.set_field("S1", "otp_attempts", "3", Duration::MAX).unwrap();

        clock.advance(100_000 * MINUTE);
        assert_eq!(store.get("a@b.com").unwrap(), Some("42".to_string()));
        assert_eq!(store.get_field("S1", "otp_attempts").unwrap(), Some("3".to_string()));
    }

    #[test]
    fn it_saturates_the_manual_clock() {
        let clock = ManualClock::new();
        clock.advance(Duration::MAX);
        clock.advance(MINUTE);
        assert_eq!(clock.offset_millis.load(Ordering::SeqCst), u64::MAX);
    }

    #[test]
    fn it_reports_whether_delete_removed_something() {
        let clock = ManualClock::new();
        let store = clock.store();
        store.set_with_ttl("k", "1", MINUTE).unwrap();
        assert!(EphemeralStore::delete(&store, "k").unwrap());
        assert!(!EphemeralStore::delete(&store, "k").unwrap());

        store.set_with_ttl("k", "1", MINUTE).unwrap();
        clock.advance(2 * MINUTE);
        assert!(!EphemeralStore::delete(&store, "k").unwrap());
    }

    #[test]
    fn it_lets_one_of_many_racing_deletes_win() {
        let store = Arc::new(MemoryStore::new());
        store.set_with_ttl("k", "1", MINUTE).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || EphemeralStore::delete(store.as_ref(), "k").unwrap())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn it_increments_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.increment_field("S1", "n", -1).unwrap(), -1);
        assert_eq!(store.increment_field("S1", "n", 3).unwrap(), 2);
        assert_eq!(store.get_field("S1", "n").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn it_never_loses_concurrent_increments() {
        let store = Arc::new(MemoryStore::new());
        store.set_field("S1", "n", "100", MINUTE).unwrap();
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        store.increment_field("S1", "n", -1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get_field("S1", "n").unwrap(), Some("0".to_string()));
    }

    #[test]
    fn it_refuses_to_increment_text() {
        let store = MemoryStore::new();
        store.set_field("S1", "email", "a@b.com", MINUTE).unwrap();
        let err = store.increment_field("S1", "email", 1).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn it_expires_sessions_as_a_whole() {
        let clock = ManualClock::new();
        let store = clock.store();
        store.set_field("S1", "a", "1", MINUTE).unwrap();
        clock.advance(Duration::from_secs(30));
        store.set_field("S1", "b", "2", MINUTE).unwrap();

        clock.advance(Duration::from_secs(45));
        assert_eq!(store.get_field("S1", "a").unwrap(), Some("1".to_string()));

        clock.advance(Duration::from_secs(30));
        assert!(store.get_all("S1").unwrap().is_empty());
        assert_eq!(store.increment_field("S1", "a", 1).unwrap(), 1);
    }

    #[test]
    fn it_saves_and_drops_whole_sessions() {
        let store = MemoryStore::new();
        let fields: HashMap<String, String> = [("email", "a@b.com"), ("username", "ada")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        store.save("S1", &fields, MINUTE).unwrap();
        assert_eq!(store.get_all("S1").unwrap(), fields);

        store.delete_field("S1", "username").unwrap();
        assert_eq!(store.get_field("S1", "username").unwrap(), None);

        SessionStore::delete(&store, "S1").unwrap();
        assert!(store.get_all("S1").unwrap().is_empty());
    }

    #[test]
    fn it_keeps_sessions_apart() {
        let store = MemoryStore::new();
        store.set_field("S1", "n", "3", MINUTE).unwrap();
        assert_eq!(store.get_field("S2", "n").unwrap(), None);
    }

    #[test]
    fn it_purges_expired_entries() {
        let clock = ManualClock::new();
        let store = clock.store();
        store.set_with_ttl("short", "1", MINUTE).unwrap();
        store.set_with_ttl("long", "1", 10 * MINUTE).unwrap();
        store.set_field("S1", "n", "1", MINUTE).unwrap();
        clock.advance(2 * MINUTE);
        assert_eq!(store.purge_expired().unwrap(), 2);
        assert_eq!(store.get("long").unwrap(), Some("1".to_string()));
    }
}
