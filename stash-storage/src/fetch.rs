//! Source-of-truth fetchers and the execution modes that run them.
//!
//! A cache is built in exactly one mode:
//!
//! - [`Blocking`] wraps a [`Fetcher`]; the cache's `get`/`refresh` are plain
//!   functions and the fetch runs to completion on the caller's thread.
//! - [`Suspending`] wraps an [`AsyncFetcher`]; `get`/`refresh` are `async` and
//!   the fetch future is awaited, letting other tasks run meanwhile.
//!
//! The mode is part of the cache's type, so the two can never be mixed on one
//! cache. Closures implement both fetcher traits.

use std::future::Future;

use stash_core::Identity;

/// Blocking source of truth.
///
/// `Ok(None)` means the entity does not exist; nothing is cached for it.
pub trait Fetcher<A, V>: Send + Sync {
    type Error;

    fn fetch(&self, identity: Identity, args: A) -> Result<Option<V>, Self::Error>;
}

impl<F, A, V, E> Fetcher<A, V> for F
where
    F: Fn(Identity, A) -> Result<Option<V>, E> + Send + Sync,
{
    type Error = E;

    fn fetch(&self, identity: Identity, args: A) -> Result<Option<V>, E> {
        self(identity, args)
    }
}

/// Suspend-capable source of truth.
pub trait AsyncFetcher<A, V>: Send + Sync {
    type Error;

    fn fetch(
        &self,
        identity: Identity,
        args: A,
    ) -> impl Future<Output = Result<Option<V>, Self::Error>> + Send;
}

impl<F, Fut, A, V, E> AsyncFetcher<A, V> for F
where
    F: Fn(Identity, A) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<V>, E>> + Send,
{
    type Error = E;

    fn fetch(&self, identity: Identity, args: A) -> impl Future<Output = Result<Option<V>, E>> + Send {
        self(identity, args)
    }
}

/// Run the fetcher to completion before the cache operation returns.
#[derive(Debug, Clone)]
pub struct Blocking<F>(F);

impl<F> Blocking<F> {
    pub fn new(fetcher: F) -> Self {
        Self(fetcher)
    }

    pub fn fetcher(&self) -> &F {
        &self.0
    }
}

/// Await the fetcher cooperatively.
#[derive(Debug, Clone)]
pub struct Suspending<F>(F);

impl<F> Suspending<F> {
    pub fn new(fetcher: F) -> Self {
        Self(fetcher)
    }

    pub fn fetcher(&self) -> &F {
        &self.0
    }
}
