//! Cache over a flat keyspace.
//!
//! Every entry lives at its own key, `namespace#identity`, and may carry an
//! expiry.

use std::time::Duration;

use stash_core::{
    CacheKey, CacheSettings, Codec, ConfigError, Identity, KeyError, Namespace, Passthrough,
};

use crate::aside::{Aside, Lookup, Slot};
use crate::fetch::{AsyncFetcher, Blocking, Fetcher, Suspending};
use crate::store::KeyValueStore;

/// Cache-aside client over a flat keyspace.
///
/// # Type Parameters
///
/// - `S`: The key-value store
/// - `M`: The execution mode, [`Blocking`] or [`Suspending`], wrapping the fetcher
/// - `C`: The codec applied at the storage boundary
///
/// # Example
///
/// ```
/// use std::convert::Infallible;
/// use stash_core::Passthrough;
/// use stash_storage::{FlatCache, InMemoryStore};
///
/// let cache = FlatCache::blocking(InMemoryStore::new(), "user", |id: u64, (): ()| {
///     Ok::<_, Infallible>(Some(format!("user-{id}")))
/// })
/// .unwrap()
/// .with_codec(Passthrough::<String>::new());
///
/// assert_eq!(cache.get(42, ()).unwrap().as_deref(), Some("user-42"));
/// assert!(cache.set(42, &"renamed".to_string()));
/// assert_eq!(cache.get(42, ()).unwrap().as_deref(), Some("renamed"));
/// ```
pub struct FlatCache<S, M, C = Passthrough> {
    namespace: Namespace,
    mode: M,
    aside: Aside<S, C>,
}

impl<S, F> FlatCache<S, Blocking<F>> {
    /// Build a cache whose fetcher runs to completion on the caller's thread.
    pub fn blocking(store: S, namespace: &str, fetcher: F) -> Result<Self, KeyError> {
        Ok(Self::with_mode(store, Namespace::new(namespace)?, Blocking::new(fetcher)))
    }
}

impl<S, F> FlatCache<S, Suspending<F>> {
    /// Build a cache whose fetcher is awaited.
    pub fn suspending(store: S, namespace: &str, fetcher: F) -> Result<Self, KeyError> {
        Ok(Self::with_mode(
            store,
            Namespace::new(namespace)?,
            Suspending::new(fetcher),
        ))
    }
}

impl<S, M> FlatCache<S, M> {
    /// Build a cache from loaded settings and an explicit mode.
    pub fn from_settings(store: S, settings: &CacheSettings, mode: M) -> Result<Self, ConfigError> {
        let namespace = settings.validate()?;
        let mut cache = Self::with_mode(store, namespace, mode);
        cache.aside.set_ttl(settings.ttl());
        Ok(cache)
    }

    fn with_mode(store: S, namespace: Namespace, mode: M) -> Self {
        Self {
            namespace,
            mode,
            aside: Aside::new(store, Passthrough::new()),
        }
    }
}

impl<S, M, C> FlatCache<S, M, C> {
    /// Replace the codec applied at the storage boundary.
    pub fn with_codec<C2: Codec>(self, codec: C2) -> FlatCache<S, M, C2> {
        FlatCache {
            namespace: self.namespace,
            mode: self.mode,
            aside: self.aside.with_codec(codec),
        }
    }

    /// Expire entries `ttl` after they are written. A zero `ttl` disables
    /// expiry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.aside.set_ttl(Some(ttl).filter(|ttl| !ttl.is_zero()));
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.aside.ttl()
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

    /// The store key for `identity`.
    pub fn key(&self, identity: Identity) -> CacheKey {
        self.namespace.key(identity)
    }
}

impl<S: KeyValueStore, M, C: Codec> FlatCache<S, M, C> {
    /// Write `value` for `identity`, overwriting any cached entry.
    ///
    /// Returns `false` if the store rejected the write.
    pub fn set(&self, identity: Identity, value: &C::Value) -> bool {
        let key = self.key(identity);
        self.aside.put(Slot::Key(&key), value)
    }

    /// Remove the entry for `identity`. Returns the removed count, `0` on
    /// store failure.
    pub fn delete(&self, identity: Identity) -> u64 {
        let key = self.key(identity);
        self.aside.remove(Slot::Key(&key))
    }
}

impl<S: KeyValueStore, F, C: Codec> FlatCache<S, Blocking<F>, C> {
    /// Return the cached value for `identity`, fetching and caching it on a miss.
    ///
    /// If the store fails, the fetcher's result is returned without caching.
    /// Fetcher errors are returned unchanged.
    pub fn get<A>(
        &self,
        identity: Identity,
        args: A,
    ) -> Result<Option<C::Value>, <F as Fetcher<A, C::Value>>::Error>
    where
        F: Fetcher<A, C::Value>,
    {
        let key = self.key(identity);
        let slot = Slot::Key(&key);
        match self.aside.lookup(slot) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Miss => {
                let fetched = Fetcher::fetch(self.mode.fetcher(), identity, args)?;
                Ok(fetched.and_then(|value| self.aside.fill(slot, value)))
            }
            Lookup::Unavailable => Fetcher::fetch(self.mode.fetcher(), identity, args),
        }
    }

    /// Fetch `identity` from the source of truth and overwrite the cache.
    ///
    /// Returns `Ok(false)` if the fetcher found nothing or the write failed.
    pub fn refresh<A>(
        &self,
        identity: Identity,
        args: A,
    ) -> Result<bool, <F as Fetcher<A, C::Value>>::Error>
    where
        F: Fetcher<A, C::Value>,
    {
        Ok(match Fetcher::fetch(self.mode.fetcher(), identity, args)? {
            Some(value) => self.set(identity, &value),
            None => false,
        })
    }
}

impl<S: KeyValueStore, F, C: Codec> FlatCache<S, Suspending<F>, C> {
    /// Return the cached value for `identity`, awaiting the fetcher on a miss.
    ///
    /// If the store fails, the fetcher's result is returned without caching.
    /// Fetcher errors are returned unchanged.
    pub async fn get<A>(
        &self,
        identity: Identity,
        args: A,
    ) -> Result<Option<C::Value>, <F as AsyncFetcher<A, C::Value>>::Error>
    where
        F: AsyncFetcher<A, C::Value>,
    {
        let key = self.key(identity);
        let slot = Slot::Key(&key);
        match self.aside.lookup(slot) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Miss => {
                let fetched = AsyncFetcher::fetch(self.mode.fetcher(), identity, args).await?;
                Ok(fetched.and_then(|value| self.aside.fill(slot, value)))
            }
            Lookup::Unavailable => AsyncFetcher::fetch(self.mode.fetcher(), identity, args).await,
        }
    }

    /// Await the fetcher for `identity` and overwrite the cache.
    pub async fn refresh<A>(
        &self,
        identity: Identity,
        args: A,
    ) -> Result<bool, <F as AsyncFetcher<A, C::Value>>::Error>
    where
        F: AsyncFetcher<A, C::Value>,
    {
        Ok(match AsyncFetcher::fetch(self.mode.fetcher(), identity, args).await? {
            Some(value) => self.set(identity, &value),
            None => false,
        })
    }
}
