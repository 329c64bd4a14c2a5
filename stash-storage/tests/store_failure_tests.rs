//! Integration Tests for Degraded Store Behavior
//!
//! The store is an optimization. When it fails, `get` SHALL return the
//! fetcher's result, writes SHALL report `false`, deletes SHALL report `0`,
//! and no connection SHALL be left checked out.

use std::convert::Infallible;
use std::sync::Arc;

use stash_core::{JsonCodec, Passthrough};
use stash_storage::{FlatCache, HashCache, KeyValueStore, StoreConnection};
use stash_test_utils::fixtures::{profile, Profile};
use stash_test_utils::{init_tracing, Command, CountingFetcher, FaultyStore, Identity};

fn echo(id: Identity, (): ()) -> Result<Option<Vec<u8>>, Infallible> {
    Ok(Some(format!("value-{id}").into_bytes()))
}

// ============================================================================
// STORE FULLY DOWN
// ============================================================================

#[test]
fn test_flat_cache_serves_fetcher_when_store_is_down() {
    init_tracing();
    let store = Arc::new(FaultyStore::unavailable());
    let fetcher = CountingFetcher::new(echo);
    let cache = FlatCache::blocking(store.clone(), "user", fetcher.clone()).unwrap();

    assert_eq!(cache.get(1, ()).unwrap(), Some(b"value-1".to_vec()));
    assert_eq!(cache.get(1, ()).unwrap(), Some(b"value-1".to_vec()));
    assert_eq!(fetcher.calls(), 2);

    assert!(!cache.set(1, &b"manual".to_vec()));
    assert!(!cache.refresh(1, ()).unwrap());
    assert_eq!(cache.delete(1), 0);
    assert_eq!(store.open_connections(), 0);
}

#[test]
fn test_hash_cache_serves_fetcher_when_store_is_down() {
    init_tracing();
    let store = Arc::new(FaultyStore::unavailable());
    let fetcher = CountingFetcher::new(echo);
    let cache = HashCache::blocking(store.clone(), "team", "member", fetcher.clone()).unwrap();

    assert_eq!(cache.get(10, 2, ()).unwrap(), Some(b"value-2".to_vec()));
    assert_eq!(fetcher.calls(), 1);

    assert!(!cache.set(10, 2, &b"manual".to_vec()));
    assert!(!cache.refresh(10, 2, ()).unwrap());
    assert_eq!(cache.delete(10, 2), 0);
    assert_eq!(cache.delete_bucket(10), 0);
    assert_eq!(store.open_connections(), 0);
}

#[test]
fn test_store_recovery_resumes_caching() {
    let store = Arc::new(FaultyStore::unavailable());
    let fetcher = CountingFetcher::new(echo);
    let cache = FlatCache::blocking(store.clone(), "user", fetcher.clone()).unwrap();

    cache.get(5, ()).unwrap();
    store.heal();
    cache.get(5, ()).unwrap();
    cache.get(5, ()).unwrap();

    // One uncached call while down, one populating call after recovery.
    assert_eq!(fetcher.calls(), 2);
}

// ============================================================================
// SINGLE COMMAND FAILURES
// ============================================================================

#[test]
fn test_populate_failure_still_returns_fetched_value() {
    init_tracing();
    let store = Arc::new(FaultyStore::new());
    store.fail(Command::Set);
    let fetcher = CountingFetcher::new(echo);
    let cache = FlatCache::blocking(store.clone(), "user", fetcher.clone()).unwrap();

    assert_eq!(cache.get(3, ()).unwrap(), Some(b"value-3".to_vec()));
    assert_eq!(fetcher.calls(), 1);
    assert!(store.inner().is_empty());

    // Nothing was cached, so the next read fetches again.
    cache.get(3, ()).unwrap();
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(store.open_connections(), 0);
}

#[test]
fn test_read_failure_after_exists_skips_populate() {
    let store = Arc::new(FaultyStore::new());
    let fetcher = CountingFetcher::new(echo);
    let cache = FlatCache::blocking(store.clone(), "user", fetcher.clone()).unwrap();

    assert!(cache.set(4, &b"cached".to_vec()));
    store.fail(Command::Get);

    // The fetcher's answer wins and the cached entry is left alone.
    assert_eq!(cache.get(4, ()).unwrap(), Some(b"value-4".to_vec()));
    store.recover(Command::Get);
    assert_eq!(cache.get(4, ()).unwrap(), Some(b"cached".to_vec()));
    assert_eq!(fetcher.calls(), 1);
}

#[test]
fn test_expire_failure_reports_unsuccessful_set() {
    let store = Arc::new(FaultyStore::new());
    store.fail(Command::Expire);
    let cache = FlatCache::blocking(store.clone(), "session", echo)
        .unwrap()
        .with_ttl(std::time::Duration::from_secs(60));

    assert!(!cache.set(1, &b"token".to_vec()));
    assert_eq!(store.injected_failures(), 1);
    assert_eq!(store.open_connections(), 0);
}

#[test]
fn test_hash_write_failure_is_reported() {
    let store = Arc::new(FaultyStore::new());
    store.fail(Command::HashSet);
    let fetcher = CountingFetcher::new(echo);
    let cache = HashCache::blocking(store.clone(), "team", "member", fetcher.clone()).unwrap();

    assert!(!cache.set(1, 1, &b"x".to_vec()));
    assert_eq!(cache.get(1, 1, ()).unwrap(), Some(b"value-1".to_vec()));
    assert_eq!(cache.get(1, 1, ()).unwrap(), Some(b"value-1".to_vec()));
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(store.open_connections(), 0);
}

#[test]
fn test_delete_failure_returns_zero() {
    let store = Arc::new(FaultyStore::new());
    let cache = FlatCache::blocking(store.clone(), "user", echo).unwrap();

    assert!(cache.set(8, &b"x".to_vec()));
    store.fail(Command::Delete);
    assert_eq!(cache.delete(8), 0);
    store.recover(Command::Delete);
    assert_eq!(cache.delete(8), 1);
}

// ============================================================================
// CODEC FAILURES
// ============================================================================

#[test]
fn test_undecodable_entry_is_refetched_and_overwritten() {
    init_tracing();
    let store = Arc::new(FaultyStore::new());
    let fetcher = CountingFetcher::new(|id: Identity, (): ()| Ok::<_, Infallible>(Some(profile(id))));
    let cache = FlatCache::blocking(store.clone(), "profile", fetcher.clone())
        .unwrap()
        .with_codec(JsonCodec::<Profile>::new());

    let key = cache.key(12);
    store
        .inner()
        .connection()
        .unwrap()
        .set(key.as_str(), b"{not json")
        .unwrap();

    assert_eq!(cache.get(12, ()).unwrap(), Some(profile(12)));
    assert_eq!(cache.get(12, ()).unwrap(), Some(profile(12)));
    assert_eq!(fetcher.calls(), 1);
}

#[test]
fn test_text_cache_treats_invalid_utf8_as_miss() {
    let store = Arc::new(FaultyStore::new());
    let cache = FlatCache::blocking(store.clone(), "label", |id: Identity, (): ()| {
        Ok::<_, Infallible>(Some(format!("label {id}")))
    })
    .unwrap()
    .with_codec(Passthrough::<String>::new());

    let key = cache.key(1);
    store
        .inner()
        .connection()
        .unwrap()
        .set(key.as_str(), &[0xff, 0xfe])
        .unwrap();

    assert_eq!(cache.get(1, ()).unwrap().as_deref(), Some("label 1"));
    let stored = store.inner().connection().unwrap().get(key.as_str()).unwrap();
    assert_eq!(stored, Some(b"label 1".to_vec()));
}
