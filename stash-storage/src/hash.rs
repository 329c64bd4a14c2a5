//! Cache over a bucketed keyspace.
//!
//! Related entries are grouped as fields of one hash record. The record lives
//! at the bucket key (`bucket_namespace#bucket`) and each field is named by
//! the entry's flat key (`namespace#identity`), so a whole group can be
//! dropped with a single delete.

use stash_core::{
    CacheKey, CacheSettings, Codec, ConfigError, Identity, KeyError, Namespace, Passthrough,
};

use crate::aside::{Aside, Lookup, Slot};
use crate::fetch::{AsyncFetcher, Blocking, Fetcher, Suspending};
use crate::store::KeyValueStore;

/// Cache-aside client over hash buckets.
///
/// Hash fields cannot expire individually, so this cache has no TTL.
pub struct HashCache<S, M, C = Passthrough> {
    bucket_namespace: Namespace,
    namespace: Namespace,
    mode: M,
    aside: Aside<S, C>,
}

impl<S, F> HashCache<S, Blocking<F>> {
    /// Build a cache whose fetcher runs to completion on the caller's thread.
    pub fn blocking(
        store: S,
        bucket_namespace: &str,
        namespace: &str,
        fetcher: F,
    ) -> Result<Self, KeyError> {
        Ok(Self::with_mode(
            store,
            Namespace::new(bucket_namespace)?,
            Namespace::new(namespace)?,
            Blocking::new(fetcher),
        ))
    }
}

impl<S, F> HashCache<S, Suspending<F>> {
    /// Build a cache whose fetcher is awaited.
    pub fn suspending(
        store: S,
        bucket_namespace: &str,
        namespace: &str,
        fetcher: F,
    ) -> Result<Self, KeyError> {
        Ok(Self::with_mode(
            store,
            Namespace::new(bucket_namespace)?,
            Namespace::new(namespace)?,
            Suspending::new(fetcher),
        ))
    }
}

impl<S, M> HashCache<S, M> {
    /// Build a cache from loaded settings and an explicit mode.
    ///
    /// `settings.namespace` names the entries; a configured TTL is rejected
    /// because hash fields cannot carry one.
    pub fn from_settings(
        store: S,
        bucket_namespace: &str,
        settings: &CacheSettings,
        mode: M,
    ) -> Result<Self, ConfigError> {
        let namespace = settings.validate()?;
        if let Some(ttl) = settings.ttl_secs {
            return Err(ConfigError::InvalidValue {
                field: "ttl_secs".to_string(),
                value: ttl.to_string(),
                reason: "hash fields cannot expire individually".to_string(),
            });
        }
        let bucket_namespace =
            Namespace::new(bucket_namespace).map_err(|e| ConfigError::InvalidValue {
                field: "bucket_namespace".to_string(),
                value: bucket_namespace.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::with_mode(store, bucket_namespace, namespace, mode))
    }

    fn with_mode(store: S, bucket_namespace: Namespace, namespace: Namespace, mode: M) -> Self {
        Self {
            bucket_namespace,
            namespace,
            mode,
            aside: Aside::new(store, Passthrough::new()),
        }
    }
}

impl<S, M, C> HashCache<S, M, C> {
    /// Replace the codec applied at the storage boundary.
    pub fn with_codec<C2: Codec>(self, codec: C2) -> HashCache<S, M, C2> {
        HashCache {
            bucket_namespace: self.bucket_namespace,
            namespace: self.namespace,
            mode: self.mode,
            aside: self.aside.with_codec(codec),
        }
    }

    pub fn bucket_namespace(&self) -> &Namespace {
        &self.bucket_namespace
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn store(&self) -> &S {
        self.aside.store()
    }

    pub fn codec(&self) -> &C {
        self.aside.codec()
    }

    pub fn mode(&self) -> &M {
        &self.mode
    }

    /// The store key of the hash record for `bucket`.
    pub fn bucket_key(&self, bucket: Identity) -> CacheKey {
        self.bucket_namespace.key(bucket)
    }

    /// The field name for `identity` inside any bucket.
    pub fn field_key(&self, identity: Identity) -> CacheKey {
        self.namespace.key(identity)
    }
}

impl<S: KeyValueStore, M, C: Codec> HashCache<S, M, C> {
    /// Write `value` for `identity` inside `bucket`.
    ///
    /// Returns `false` if the store rejected the write.
    pub fn set(&self, bucket: Identity, identity: Identity, value: &C::Value) -> bool {
        let (bucket, field) = (self.bucket_key(bucket), self.field_key(identity));
        self.aside.put(field_slot(&bucket, &field), value)
    }

    /// Remove one entry. Returns the removed count, `0` on store failure.
    pub fn delete(&self, bucket: Identity, identity: Identity) -> u64 {
        let (bucket, field) = (self.bucket_key(bucket), self.field_key(identity));
        self.aside.remove(field_slot(&bucket, &field))
    }

    /// Remove a whole bucket. Returns the removed count, `0` on store failure.
    pub fn delete_bucket(&self, bucket: Identity) -> u64 {
        let bucket = self.bucket_key(bucket);
        self.aside.remove(Slot::Key(&bucket))
    }
}

fn field_slot<'a>(bucket: &'a CacheKey, field: &'a CacheKey) -> Slot<'a> {
    Slot::Field { bucket, field }
}

impl<S: KeyValueStore, F, C: Codec> HashCache<S, Blocking<F>, C> {
    /// Return the cached value for `identity` in `bucket`, fetching and
    /// caching it on a miss.
    ///
    /// The fetcher only receives the identity and `args`; the bucket is a
    /// storage concern. If the store fails, the fetcher's result is returned
    /// without caching.
    pub fn get<A>(
        &self,
        bucket: Identity,
        identity: Identity,
        args: A,
    ) -> Result<Option<C::Value>, <F as Fetcher<A, C::Value>>::Error>
    where
        F: Fetcher<A, C::Value>,
    {
        let (bucket, field) = (self.bucket_key(bucket), self.field_key(identity));
        let slot = field_slot(&bucket, &field);
        match self.aside.lookup(slot) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Miss => {
                let fetched = Fetcher::fetch(self.mode.fetcher(), identity, args)?;
                Ok(fetched.and_then(|value| self.aside.fill(slot, value)))
            }
            Lookup::Unavailable => Fetcher::fetch(self.mode.fetcher(), identity, args),
        }
    }

    /// Fetch `identity` from the source of truth and overwrite its field in
    /// `bucket`.
    pub fn refresh<A>(
        &self,
        bucket: Identity,
        identity: Identity,
        args: A,
    ) -> Result<bool, <F as Fetcher<A, C::Value>>::Error>
    where
        F: Fetcher<A, C::Value>,
    {
        Ok(match Fetcher::fetch(self.mode.fetcher(), identity, args)? {
            Some(value) => self.set(bucket, identity, &value),
            None => false,
        })
    }
}

impl<S: KeyValueStore, F, C: Codec> HashCache<S, Suspending<F>, C> {
    /// Return the cached value for `identity` in `bucket`, awaiting the
    /// fetcher on a miss.
    pub async fn get<A>(
        &self,
        bucket: Identity,
        identity: Identity,
        args: A,
    ) -> Result<Option<C::Value>, <F as AsyncFetcher<A, C::Value>>::Error>
    where
        F: AsyncFetcher<A, C::Value>,
    {
        let (bucket, field) = (self.bucket_key(bucket), self.field_key(identity));
        let slot = field_slot(&bucket, &field);
        match self.aside.lookup(slot) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Miss => {
                let fetched = AsyncFetcher::fetch(self.mode.fetcher(), identity, args).await?;
                Ok(fetched.and_then(|value| self.aside.fill(slot, value)))
            }
            Lookup::Unavailable => AsyncFetcher::fetch(self.mode.fetcher(), identity, args).await,
        }
    }

    /// Await the fetcher for `identity` and overwrite its field in `bucket`.
    pub async fn refresh<A>(
        &self,
        bucket: Identity,
        identity: Identity,
        args: A,
    ) -> Result<bool, <F as AsyncFetcher<A, C::Value>>::Error>
    where
        F: AsyncFetcher<A, C::Value>,
    {
        Ok(match AsyncFetcher::fetch(self.mode.fetcher(), identity, args).await? {
            Some(value) => self.set(bucket, identity, &value),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreConnection};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_keys_use_both_namespaces() {
        let cache = HashCache::blocking(InMemoryStore::new(), "team", "member", |_: Identity, (): ()| {
            Ok::<Option<Vec<u8>>, Infallible>(None)
        })
        .unwrap();

        assert_eq!(cache.bucket_key(1).as_str(), "000000TEAM#0000000001");
        assert_eq!(cache.field_key(7).as_str(), "0000MEMBER#0000000007");
    }

    #[test]
    fn test_rejects_short_bucket_namespace() {
        let result = HashCache::blocking(InMemoryStore::new(), "tm", "member", |_: Identity, (): ()| {
            Ok::<Option<Vec<u8>>, Infallible>(None)
        });
        assert!(matches!(result.err(), Some(KeyError::InvalidNamespace { .. })));
    }

    #[test]
    fn test_entries_are_hash_fields() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = HashCache::blocking(InMemoryStore::new(), "team", "member", move |id: Identity, (): ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Some(format!("member-{id}")))
        })
        .unwrap()
        .with_codec(Passthrough::<String>::new());

        assert_eq!(cache.get(1, 7, ()).unwrap().as_deref(), Some("member-7"));
        assert_eq!(cache.get(1, 7, ()).unwrap().as_deref(), Some("member-7"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Same identity in another bucket is a separate entry.
        assert_eq!(cache.get(2, 7, ()).unwrap().as_deref(), Some("member-7"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let mut conn = cache.store().connection().unwrap();
        assert_eq!(
            conn.hash_get("000000TEAM#0000000001", "0000MEMBER#0000000007")
                .unwrap(),
            Some(b"member-7".to_vec())
        );
    }

    #[test]
    fn test_delete_field_and_bucket() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = HashCache::blocking(InMemoryStore::new(), "team", "member", move |_: Identity, (): ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Some(b"fetched".to_vec()))
        })
        .unwrap();

        assert!(cache.set(1, 7, &b"a".to_vec()));
        assert!(cache.set(1, 8, &b"b".to_vec()));

        assert_eq!(cache.delete(1, 7), 1);
        assert_eq!(cache.delete(1, 7), 0);
        assert_eq!(cache.get(1, 8, ()).unwrap(), Some(b"b".to_vec()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(cache.delete_bucket(1), 1);
        assert_eq!(cache.delete_bucket(1), 0);
        assert_eq!(cache.get(1, 8, ()).unwrap(), Some(b"fetched".to_vec()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bucket_colliding_with_plain_key_degrades() {
        let store = Arc::new(InMemoryStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = HashCache::blocking(store.clone(), "team", "member", move |_: Identity, (): ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Some(b"direct".to_vec()))
        })
        .unwrap();
        store
            .connection()
            .unwrap()
            .set("000000TEAM#0000000001", b"plain")
            .unwrap();

        assert_eq!(cache.get(1, 7, ()).unwrap(), Some(b"direct".to_vec()));
        assert_eq!(cache.get(1, 7, ()).unwrap(), Some(b"direct".to_vec()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.set(1, 7, &b"v".to_vec()));
        assert_eq!(cache.delete(1, 7), 0);
        assert_eq!(store.open_connections(), 0);
    }

    #[test]
    fn test_from_settings_rejects_ttl() {
        let mode = Blocking::new(|_: Identity, (): ()| Ok::<Option<Vec<u8>>, Infallible>(None));
        let settings = CacheSettings::new("member").with_ttl_secs(60);
        let err = HashCache::from_settings(InMemoryStore::new(), "team", &settings, mode)
            .err()
            .expect("ttl not supported");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "ttl_secs"));
    }

    #[tokio::test]
    async fn test_suspending_refresh_and_get() {
        let cache = HashCache::suspending(InMemoryStore::new(), "team", "member", |id: Identity, scale: u64| async move {
            Ok::<_, Infallible>(Some((id * scale).to_string()))
        })
        .unwrap()
        .with_codec(Passthrough::<String>::new());

        assert!(cache.refresh(3, 5, 10u64).await.unwrap());
        assert_eq!(cache.get(3, 5, 1u64).await.unwrap().as_deref(), Some("50"));
        assert_eq!(cache.get(4, 5, 2u64).await.unwrap().as_deref(), Some("10"));
    }
}
