//! Process-local store.
//!
//! Mirrors the Redis semantics the caches rely on: plain values and hashes
//! live in one keyspace, mixing them fails with `WRONGTYPE`, and expiries use
//! the same whole-second granularity as Redis. Expired entries are hidden from
//! reads and swept on every write. It also counts live connection guards,
//! which makes scoped release observable in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use stash_core::{StoreError, StoreResult};

use super::{expiry_secs, KeyValueStore, StoreConnection};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Plain(Vec<u8>),
    Hash(HashMap<String, Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn plain(value: &[u8]) -> Self {
        Self {
            value: Value::Plain(value.to_vec()),
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

fn deadline(ttl: Duration) -> Instant {
    Instant::now() + Duration::from_secs(expiry_secs(ttl))
}

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    open: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connection guards currently alive.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of live (unexpired) keys.
    /// Number of live keys. Inspection helpers read through a poisoned lock.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time-to-live of a key, if it exists and has an expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key).filter(|e| e.is_live(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    fn read<T>(&self, key: &str, f: impl FnOnce(Option<&Entry>) -> StoreResult<T>) -> StoreResult<T> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let now = Instant::now();
        f(entries.get(key).filter(|e| e.is_live(now)))
    }

    fn write<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Entry>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
        f(&mut entries)
    }
}

impl KeyValueStore for InMemoryStore {
    type Connection<'a> = InMemoryConnection<'a>;

    fn connection(&self) -> StoreResult<InMemoryConnection<'_>> {
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(InMemoryConnection { store: self })
    }
}

/// Connection guard for [`InMemoryStore`].
#[derive(Debug)]
pub struct InMemoryConnection<'a> {
    store: &'a InMemoryStore,
}

impl Drop for InMemoryConnection<'_> {
    fn drop(&mut self) {
        self.store.open.fetch_sub(1, Ordering::SeqCst);
    }
}

fn wrong_type(command: &'static str) -> StoreError {
    StoreError::command(command, WRONGTYPE)
}

impl StoreConnection for InMemoryConnection<'_> {
    fn exists(&mut self, key: &str) -> StoreResult<bool> {
        self.store.read(key, |entry| Ok(entry.is_some()))
    }

    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.store.read(key, |entry| match entry.map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Plain(value)) => Ok(Some(value.clone())),
            Some(Value::Hash(_)) => Err(wrong_type("GET")),
        })
    }

    fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.store.write(key, |entries| {
            entries.insert(key.to_string(), Entry::plain(value));
            Ok(())
        })
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.store.write(key, |entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline(ttl));
                Ok(true)
            }
            None => Ok(false),
        })
    }

    fn set_with_expiry(&mut self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.store.write(key, |entries| {
            let mut entry = Entry::plain(value);
            entry.expires_at = Some(deadline(ttl));
            entries.insert(key.to_string(), entry);
            Ok(())
        })
    }

    fn delete(&mut self, key: &str) -> StoreResult<u64> {
        self.store
            .write(key, |entries| Ok(u64::from(entries.remove(key).is_some())))
    }

    fn hash_exists(&mut self, bucket: &str, field: &str) -> StoreResult<bool> {
        self.store.read(bucket, |entry| match entry.map(|e| &e.value) {
            None => Ok(false),
            Some(Value::Hash(fields)) => Ok(fields.contains_key(field)),
            Some(Value::Plain(_)) => Err(wrong_type("HEXISTS")),
        })
    }

    fn hash_get(&mut self, bucket: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        self.store.read(bucket, |entry| match entry.map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(Value::Plain(_)) => Err(wrong_type("HGET")),
        })
    }

    fn hash_set(&mut self, bucket: &str, field: &str, value: &[u8]) -> StoreResult<()> {
        self.store.write(bucket, |entries| {
            let entry = entries.entry(bucket.to_string()).or_insert_with(|| Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Hash(fields) => {
                    fields.insert(field.to_string(), value.to_vec());
                    Ok(())
                }
                Value::Plain(_) => Err(wrong_type("HSET")),
            }
        })
    }

    fn hash_delete(&mut self, bucket: &str, field: &str) -> StoreResult<u64> {
        self.store.write(bucket, |entries| {
            let Some(entry) = entries.get_mut(bucket) else {
                return Ok(0);
            };
            let (removed, now_empty) = match &mut entry.value {
                Value::Hash(fields) => (fields.remove(field).is_some(), fields.is_empty()),
                Value::Plain(_) => return Err(wrong_type("HDEL")),
            };
            // Redis drops a hash once its last field is gone.
            if now_empty {
                entries.remove(bucket);
            }
            Ok(u64::from(removed))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_value_lifecycle() {
        let store = InMemoryStore::new();
        let mut conn = store.connection().unwrap();

        assert!(!conn.exists("k").unwrap());
        assert_eq!(conn.get("k").unwrap(), None);

        conn.set("k", b"v1").unwrap();
        assert!(conn.exists("k").unwrap());
        assert_eq!(conn.get("k").unwrap(), Some(b"v1".to_vec()));

        conn.set("k", b"v2").unwrap();
        assert_eq!(conn.get("k").unwrap(), Some(b"v2".to_vec()));

        assert_eq!(conn.delete("k").unwrap(), 1);
        assert_eq!(conn.delete("k").unwrap(), 0);
        assert!(!conn.exists("k").unwrap());
    }

    #[test]
    fn test_empty_value_still_exists() {
        let store = InMemoryStore::new();
        let mut conn = store.connection().unwrap();
        conn.set("k", b"").unwrap();
        assert!(conn.exists("k").unwrap());
        assert_eq!(conn.get("k").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_expired_keys_disappear() {
        let store = InMemoryStore::new();
        let mut conn = store.connection().unwrap();

        conn.set_with_expiry("short", b"v", Duration::from_millis(10))
            .unwrap();
        conn.set_with_expiry("long", b"v", Duration::from_secs(60))
            .unwrap();
        // Rounded up to one second.
        assert!(store.ttl("short").expect("expiry set") > Duration::from_millis(900));
        std::thread::sleep(Duration::from_millis(1100));

        assert!(!conn.exists("short").unwrap());
        assert_eq!(conn.get("short").unwrap(), None);
        assert_eq!(conn.delete("short").unwrap(), 0);
        assert!(conn.exists("long").unwrap());
        drop(conn);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_writes_sweep_expired_keys() {
        let store = InMemoryStore::new();
        let mut conn = store.connection().unwrap();
        conn.set_with_expiry("a", b"v", Duration::from_millis(1)).unwrap();
        conn.set_with_expiry("b", b"v", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(1100));

        conn.set("c", b"v").unwrap();
        assert_eq!(store.entries.read().unwrap().len(), 1);
    }

    #[test]
    fn test_poisoned_lock_fails_commands_but_not_inspection() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        store.connection().unwrap().set("k", b"v").unwrap();

        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        let mut conn = store.connection().unwrap();
        assert_eq!(conn.get("k"), Err(StoreError::LockPoisoned));
        assert_eq!(conn.set("k", b"w"), Err(StoreError::LockPoisoned));
        drop(conn);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_clears_previous_expiry() {
        let store = InMemoryStore::new();
        let mut conn = store.connection().unwrap();
        conn.set_with_expiry("k", b"v", Duration::from_secs(60))
            .unwrap();
        assert!(store.ttl("k").is_some());
        conn.set("k", b"v").unwrap();
        assert_eq!(store.ttl("k"), None);
    }

    #[test]
    fn test_expire_requires_existing_key() {
        let store = InMemoryStore::new();
        let mut conn = store.connection().unwrap();
        assert!(!conn.expire("missing", Duration::from_secs(5)).unwrap());
        conn.set("k", b"v").unwrap();
        assert!(conn.expire("k", Duration::from_secs(5)).unwrap());
        let ttl = store.ttl("k").expect("expiry set");
        assert!(ttl <= Duration::from_secs(5));
        assert!(ttl > Duration::from_secs(4));
    }

    #[test]
    fn test_hash_fields_and_bucket_removal() {
        let store = InMemoryStore::new();
        let mut conn = store.connection().unwrap();

        assert!(!conn.hash_exists("b", "f1").unwrap());
        conn.hash_set("b", "f1", b"one").unwrap();
        conn.hash_set("b", "f2", b"two").unwrap();
        assert!(conn.hash_exists("b", "f1").unwrap());
        assert_eq!(conn.hash_get("b", "f2").unwrap(), Some(b"two".to_vec()));
        assert_eq!(conn.hash_get("b", "f3").unwrap(), None);

        assert_eq!(conn.hash_delete("b", "f1").unwrap(), 1);
        assert_eq!(conn.hash_delete("b", "f1").unwrap(), 0);
        assert!(conn.exists("b").unwrap());

        assert_eq!(conn.delete("b").unwrap(), 1);
        assert!(!conn.hash_exists("b", "f2").unwrap());
    }

    #[test]
    fn test_last_field_removal_drops_bucket() {
        let store = InMemoryStore::new();
        let mut conn = store.connection().unwrap();
        conn.hash_set("b", "f", b"v").unwrap();
        assert_eq!(conn.hash_delete("b", "f").unwrap(), 1);
        assert!(!conn.exists("b").unwrap());
    }

    #[test]
    fn test_wrong_type_commands_fail() {
        let store = InMemoryStore::new();
        let mut conn = store.connection().unwrap();
        conn.set("plain", b"v").unwrap();
        conn.hash_set("hash", "f", b"v").unwrap();

        let err = conn.hash_set("plain", "f", b"v").unwrap_err();
        assert!(matches!(err, StoreError::Command { command: "HSET", .. }));
        assert!(conn.hash_exists("plain", "f").is_err());
        assert!(conn.hash_get("plain", "f").is_err());
        assert!(conn.hash_delete("plain", "f").is_err());

        let err = conn.get("hash").unwrap_err();
        assert!(err.to_string().contains("WRONGTYPE"));
    }

    #[test]
    fn test_connection_guard_counts() {
        let store = InMemoryStore::new();
        assert_eq!(store.open_connections(), 0);
        let a = store.connection().unwrap();
        let b = store.connection().unwrap();
        assert_eq!(store.open_connections(), 2);
        drop(a);
        assert_eq!(store.open_connections(), 1);
        drop(b);
        assert_eq!(store.open_connections(), 0);
    }
}
