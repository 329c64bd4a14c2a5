//! Key-value store abstraction.
//!
//! The caches never talk to a client library directly. They borrow a
//! [`StoreConnection`] from a [`KeyValueStore`] for each store interaction and
//! drop it before returning, so a pooled backend gets its connection back on
//! every exit path.
//!
//! Implementations must convert their client's native errors into
//! [`StoreError`](stash_core::StoreError).

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use stash_core::StoreResult;

pub use memory::{InMemoryConnection, InMemoryStore};
#[cfg(feature = "redis")]
pub use self::redis::{RedisConnection, RedisStore};

/// A handle that hands out scoped store connections.
///
/// Implementations should be safe for concurrent use; a pooled client is the
/// usual shape.
pub trait KeyValueStore: Send + Sync {
    /// Connection guard. Dropping it releases the connection.
    type Connection<'a>: StoreConnection
    where
        Self: 'a;

    /// Acquire a connection for the duration of one operation.
    fn connection(&self) -> StoreResult<Self::Connection<'_>>;
}

/// The commands the caches issue against a store.
///
/// Semantics follow Redis: hash commands against a plain value, or plain reads
/// against a hash, fail with a command error.
pub trait StoreConnection {
    fn exists(&mut self, key: &str) -> StoreResult<bool>;

    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write a value, clearing any previous expiry.
    fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Attach an expiry to an existing key. Returns `false` if the key is absent.
    fn expire(&mut self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Write a value that expires after `ttl`.
    ///
    /// The default issues `set` followed by `expire`; backends with an atomic
    /// form should override it.
    fn set_with_expiry(&mut self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.set(key, value)?;
        self.expire(key, ttl)?;
        Ok(())
    }

    /// Remove a key of any type. Returns the number of keys removed.
    fn delete(&mut self, key: &str) -> StoreResult<u64>;

    fn hash_exists(&mut self, bucket: &str, field: &str) -> StoreResult<bool>;

    fn hash_get(&mut self, bucket: &str, field: &str) -> StoreResult<Option<Vec<u8>>>;

    fn hash_set(&mut self, bucket: &str, field: &str, value: &[u8]) -> StoreResult<()>;

    /// Remove one field. Returns the number of fields removed.
    fn hash_delete(&mut self, bucket: &str, field: &str) -> StoreResult<u64>;
}

impl<S: KeyValueStore> KeyValueStore for Arc<S> {
    type Connection<'a>
        = S::Connection<'a>
    where
        Self: 'a;

    fn connection(&self) -> StoreResult<Self::Connection<'_>> {
        (**self).connection()
    }
}

impl<S: KeyValueStore> KeyValueStore for &S {
    type Connection<'a>
        = S::Connection<'a>
    where
        Self: 'a;

    fn connection(&self) -> StoreResult<Self::Connection<'_>> {
        (**self).connection()
    }
}

/// Whole seconds for a store-side expiry, rounded up and never zero.
pub fn expiry_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_secs_rounds_up() {
        assert_eq!(expiry_secs(Duration::from_secs(60)), 60);
        assert_eq!(expiry_secs(Duration::from_millis(1500)), 2);
        assert_eq!(expiry_secs(Duration::from_millis(1)), 1);
        assert_eq!(expiry_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_shared_handles_delegate_connections() {
        let store = Arc::new(InMemoryStore::new());
        {
            let mut conn = store.connection().unwrap();
            conn.set("k", b"v").unwrap();
            assert_eq!(store.open_connections(), 1);
        }
        let borrowed = &*store;
        let mut conn = borrowed.connection().unwrap();
        assert_eq!(conn.get("k").unwrap(), Some(b"v".to_vec()));
        drop(conn);
        assert_eq!(store.open_connections(), 0);
    }
}
