//! Store-facing half of the cache-aside flow.
//!
//! Both caches resolve their arguments to a [`Slot`] and delegate here. This
//! is the only place that touches connections or the codec, and the only
//! place that turns a store failure into a log line.

use std::fmt;
use std::time::Duration;

use stash_core::{CacheKey, Codec, StoreResult};

use crate::store::{KeyValueStore, StoreConnection};

/// Where an entry lives in the store.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot<'a> {
    /// A plain value at a key.
    Key(&'a CacheKey),
    /// A field inside the hash at `bucket`.
    Field {
        bucket: &'a CacheKey,
        field: &'a CacheKey,
    },
}

impl Slot<'_> {
    fn exists<C: StoreConnection>(self, conn: &mut C) -> StoreResult<bool> {
        match self {
            Slot::Key(key) => conn.exists(key.as_str()),
            Slot::Field { bucket, field } => conn.hash_exists(bucket.as_str(), field.as_str()),
        }
    }

    fn read<C: StoreConnection>(self, conn: &mut C) -> StoreResult<Option<Vec<u8>>> {
        match self {
            Slot::Key(key) => conn.get(key.as_str()),
            Slot::Field { bucket, field } => conn.hash_get(bucket.as_str(), field.as_str()),
        }
    }

    /// Hash fields carry no expiry of their own, so `ttl` only applies to keys.
    fn write<C: StoreConnection>(
        self,
        conn: &mut C,
        raw: &[u8],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        match (self, ttl) {
            (Slot::Key(key), Some(ttl)) => conn.set_with_expiry(key.as_str(), raw, ttl),
            (Slot::Key(key), None) => conn.set(key.as_str(), raw),
            (Slot::Field { bucket, field }, _) => {
                conn.hash_set(bucket.as_str(), field.as_str(), raw)
            }
        }
    }

    fn remove<C: StoreConnection>(self, conn: &mut C) -> StoreResult<u64> {
        match self {
            Slot::Key(key) => conn.delete(key.as_str()),
            Slot::Field { bucket, field } => conn.hash_delete(bucket.as_str(), field.as_str()),
        }
    }
}

impl fmt::Display for Slot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Key(key) => write!(f, "{}", key),
            Slot::Field { bucket, field } => write!(f, "{}[{}]", bucket, field),
        }
    }
}

/// Outcome of reading a slot.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Lookup<V> {
    /// The slot holds an entry. A value the codec reports as empty reads as
    /// `None`.
    Hit(Option<V>),
    /// Nothing usable is stored; fetch and populate.
    Miss,
    /// The store failed; fetch without populating.
    Unavailable,
}

/// Store handle, codec and expiry shared by a cache's operations.
pub(crate) struct Aside<S, C> {
    store: S,
    codec: C,
    ttl: Option<Duration>,
}

impl<S, C> Aside<S, C> {
    pub(crate) fn new(store: S, codec: C) -> Self {
        Self {
            store,
            codec,
            ttl: None,
        }
    }

    pub(crate) fn with_codec<C2>(self, codec: C2) -> Aside<S, C2> {
        Aside {
            store: self.store,
            codec,
            ttl: self.ttl,
        }
    }

    pub(crate) fn set_ttl(&mut self, ttl: Option<Duration>) {
        self.ttl = ttl;
    }

    pub(crate) fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn codec(&self) -> &C {
        &self.codec
    }
}

impl<S: KeyValueStore, C: Codec> Aside<S, C> {
    /// Check existence, then read and decode.
    pub(crate) fn lookup(&self, slot: Slot<'_>) -> Lookup<C::Value> {
        let raw = match self.read_raw(slot) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::trace!(target: "stash::cache", key = %slot, "cache miss");
                return Lookup::Miss;
            }
            Err(e) => {
                tracing::error!(
                    target: "stash::store",
                    key = %slot,
                    error = %e,
                    "[STORE] lookup failed, calling fetcher directly"
                );
                return Lookup::Unavailable;
            }
        };

        if self.codec.is_empty(&raw) {
            tracing::trace!(target: "stash::cache", key = %slot, "cache hit (empty)");
            return Lookup::Hit(None);
        }

        match self.codec.decode(&raw) {
            Ok(value) => {
                tracing::trace!(target: "stash::cache", key = %slot, "cache hit");
                Lookup::Hit(Some(value))
            }
            Err(e) => {
                tracing::warn!(
                    target: "stash::cache",
                    key = %slot,
                    error = %e,
                    "stored value could not be decoded, treating as miss"
                );
                Lookup::Miss
            }
        }
    }

    /// Populate a slot with a freshly fetched value and hand back what the
    /// caller should see. Store failures are logged and the value is still
    /// returned.
    pub(crate) fn fill(&self, slot: Slot<'_>, value: C::Value) -> Option<C::Value> {
        let raw = match self.codec.encode(&value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    target: "stash::cache",
                    key = %slot,
                    error = %e,
                    "fetched value could not be encoded, not caching"
                );
                return Some(value);
            }
        };

        if let Err(e) = self.write_raw(slot, &raw) {
            tracing::error!(
                target: "stash::store",
                key = %slot,
                error = %e,
                "[STORE] populate failed, returning fetched value"
            );
        } else {
            tracing::trace!(target: "stash::cache", key = %slot, "cache populated");
        }

        if self.codec.is_empty(&raw) {
            None
        } else {
            Some(value)
        }
    }

    /// Encode and write. Returns `false` on any failure.
    pub(crate) fn put(&self, slot: Slot<'_>, value: &C::Value) -> bool {
        let raw = match self.codec.encode(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    target: "stash::cache",
                    key = %slot,
                    error = %e,
                    "value could not be encoded, not caching"
                );
                return false;
            }
        };

        match self.write_raw(slot, &raw) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(target: "stash::store", key = %slot, error = %e, "[STORE] write failed");
                false
            }
        }
    }

    /// Remove a slot. Returns the removed count, `0` on failure.
    pub(crate) fn remove(&self, slot: Slot<'_>) -> u64 {
        let removed = self
            .store
            .connection()
            .and_then(|mut conn| slot.remove(&mut conn));

        match removed {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(target: "stash::store", key = %slot, error = %e, "[STORE] delete failed");
                0
            }
        }
    }

    fn read_raw(&self, slot: Slot<'_>) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.store.connection()?;
        if !slot.exists(&mut conn)? {
            return Ok(None);
        }
        // The entry can expire between the two commands; that reads as a miss.
        slot.read(&mut conn)
    }

    fn write_raw(&self, slot: Slot<'_>, raw: &[u8]) -> StoreResult<()> {
        let mut conn = self.store.connection()?;
        slot.write(&mut conn, raw, self.ttl)
    }
}
