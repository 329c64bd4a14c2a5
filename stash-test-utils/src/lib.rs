//! Stash Test Utilities
//!
//! Shared test infrastructure for the stash workspace:
//! - A store wrapper that fails chosen commands on demand
//! - A fetcher wrapper that counts source-of-truth calls
//! - Proptest generators for namespaces, identities and payloads
//! - Fixtures and tracing setup for integration tests

use std::future::Future;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use stash_core::{
    format_key, CacheKey, Identity, Namespace, StoreError, StoreResult, KEY_COLUMN_WIDTH,
    MIN_NAMESPACE_LEN,
};
pub use stash_storage::{
    AsyncFetcher, Fetcher, InMemoryConnection, InMemoryStore, KeyValueStore, StoreConnection,
};

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// A store operation that [`FaultyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Exists,
    Get,
    Set,
    Expire,
    Delete,
    HashExists,
    HashGet,
    HashSet,
    HashDelete,
}

impl Command {
    pub const ALL: [Command; 10] = [
        Command::Connect,
        Command::Exists,
        Command::Get,
        Command::Set,
        Command::Expire,
        Command::Delete,
        Command::HashExists,
        Command::HashGet,
        Command::HashSet,
        Command::HashDelete,
    ];

    fn bit(self) -> u16 {
        1 << self as u16
    }

    fn name(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Exists => "EXISTS",
            Command::Get => "GET",
            Command::Set => "SET",
            Command::Expire => "EXPIRE",
            Command::Delete => "DEL",
            Command::HashExists => "HEXISTS",
            Command::HashGet => "HGET",
            Command::HashSet => "HSET",
            Command::HashDelete => "HDEL",
        }
    }
}

/// In-memory store whose commands can be switched to failing at runtime.
///
/// Healthy commands are forwarded to an [`InMemoryStore`], so connection
/// accounting via [`FaultyStore::open_connections`] stays accurate on both
/// the success and the failure paths.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    failing: AtomicU16,
    injected: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store on which every operation fails, including connecting.
    pub fn unavailable() -> Self {
        let store = Self::new();
        store.fail_all();
        store
    }

    /// Make `command` fail until healed.
    pub fn fail(&self, command: Command) {
        self.failing.fetch_or(command.bit(), Ordering::SeqCst);
    }

    pub fn fail_all(&self) {
        for command in Command::ALL {
            self.fail(command);
        }
    }

    /// Let `command` succeed again.
    pub fn recover(&self, command: Command) {
        self.failing.fetch_and(!command.bit(), Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.failing.store(0, Ordering::SeqCst);
    }

    /// Number of failures returned so far.
    pub fn injected_failures(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.inner.open_connections()
    }

    /// The backing store, for seeding and inspecting state directly.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn check(&self, command: Command) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) & command.bit() == 0 {
            return Ok(());
        }
        self.injected.fetch_add(1, Ordering::SeqCst);
        Err(match command {
            Command::Connect => StoreError::Connection {
                reason: "injected connection failure".to_string(),
            },
            other => StoreError::command(other.name(), "injected failure"),
        })
    }
}

impl KeyValueStore for FaultyStore {
    type Connection<'a> = FaultyConnection<'a>;

    fn connection(&self) -> StoreResult<FaultyConnection<'_>> {
        self.check(Command::Connect)?;
        Ok(FaultyConnection {
            store: self,
            conn: self.inner.connection()?,
        })
    }
}

/// Connection guard for [`FaultyStore`].
#[derive(Debug)]
pub struct FaultyConnection<'a> {
    store: &'a FaultyStore,
    conn: InMemoryConnection<'a>,
}

impl StoreConnection for FaultyConnection<'_> {
    fn exists(&mut self, key: &str) -> StoreResult<bool> {
        self.store.check(Command::Exists)?;
        self.conn.exists(key)
    }

    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.store.check(Command::Get)?;
        self.conn.get(key)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.store.check(Command::Set)?;
        self.conn.set(key, value)
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.store.check(Command::Expire)?;
        self.conn.expire(key, ttl)
    }

    fn delete(&mut self, key: &str) -> StoreResult<u64> {
        self.store.check(Command::Delete)?;
        self.conn.delete(key)
    }

    fn hash_exists(&mut self, bucket: &str, field: &str) -> StoreResult<bool> {
        self.store.check(Command::HashExists)?;
        self.conn.hash_exists(bucket, field)
    }

    fn hash_get(&mut self, bucket: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        self.store.check(Command::HashGet)?;
        self.conn.hash_get(bucket, field)
    }

    fn hash_set(&mut self, bucket: &str, field: &str, value: &[u8]) -> StoreResult<()> {
        self.store.check(Command::HashSet)?;
        self.conn.hash_set(bucket, field, value)
    }

    fn hash_delete(&mut self, bucket: &str, field: &str) -> StoreResult<u64> {
        self.store.check(Command::HashDelete)?;
        self.conn.hash_delete(bucket, field)
    }
}

// ============================================================================
// FETCHERS
// ============================================================================

/// Wraps a fetcher and counts how often the source of truth is consulted.
///
/// Clones share the counter, so a clone can be handed to a cache while the
/// test keeps the original for assertions.
#[derive(Debug, Clone)]
pub struct CountingFetcher<F> {
    inner: F,
    calls: Arc<AtomicUsize>,
}

impl<F> CountingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<A, V, F: Fetcher<A, V>> Fetcher<A, V> for CountingFetcher<F> {
    type Error = F::Error;

    fn fetch(&self, identity: Identity, args: A) -> Result<Option<V>, F::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Fetcher::fetch(&self.inner, identity, args)
    }
}

impl<A, V, F: AsyncFetcher<A, V>> AsyncFetcher<A, V> for CountingFetcher<F> {
    type Error = F::Error;

    fn fetch(
        &self,
        identity: Identity,
        args: A,
    ) -> impl Future<Output = Result<Option<V>, F::Error>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        AsyncFetcher::fetch(&self.inner, identity, args)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache inputs.

    use proptest::prelude::*;

    /// Namespaces long enough to be accepted.
    pub fn arb_namespace() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_]{2,15}"
    }

    /// Namespaces that must be rejected.
    pub fn arb_short_namespace() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_]{0,2}"
    }

    /// Identities that fit the zero-padded column.
    pub fn arb_identity() -> impl Strategy<Value = u64> {
        0u64..10_000_000_000
    }

    /// Non-empty stored payloads; empty bytes mean "cached absence".
    pub fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 1..64)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Sample values for codec round trips.

    use serde::{Deserialize, Serialize};

    use super::Identity;

    /// A small structured record, as a JSON-coded cache would hold.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Profile {
        pub id: Identity,
        pub name: String,
        pub tags: Vec<String>,
    }

    pub fn profile(id: Identity) -> Profile {
        Profile {
            id,
            name: format!("user-{id}"),
            tags: vec!["member".to_string()],
        }
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-writer subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to tracing everything under `stash`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stash=trace"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
