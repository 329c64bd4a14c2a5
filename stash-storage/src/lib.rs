//! Stash Storage - Cache-Aside Clients
//!
//! Given an identity and a source-of-truth fetcher, the caches in this crate
//! return the stored value when present, otherwise fetch it, store it and
//! return it.
//!
//! - [`FlatCache`] keeps one key per entry and supports expiry.
//! - [`HashCache`] groups entries as fields of a hash record per bucket.
//!
//! A fetched value the codec reports as empty (see [`Codec::is_empty`]) is
//! cached like any other, and reads back as `None` without refetching.
//!
//! # Degrading on store failure
//!
//! The store is an optimization, never a dependency. When it fails, `get`
//! logs the failure and returns the fetcher's result directly, `set` and
//! `refresh` return `false`, and `delete` returns `0`. Only fetcher errors
//! reach the caller.

mod aside;
pub mod fetch;
pub mod flat;
pub mod hash;
pub mod store;

pub use fetch::{AsyncFetcher, Blocking, Fetcher, Suspending};
pub use flat::FlatCache;
pub use hash::HashCache;
pub use store::{expiry_secs, InMemoryConnection, InMemoryStore, KeyValueStore, StoreConnection};
#[cfg(feature = "redis")]
pub use store::{RedisConnection, RedisStore};

// Re-export the core types callers need alongside the caches.
pub use stash_core::{
    format_key, CacheKey, CacheSettings, Codec, CodecError, ConfigError, FnCodec, Identity,
    JsonCodec, KeyError, Namespace, Passthrough, StashError, StashResult, StoreConfig, StoreError,
    StoreResult,
};
