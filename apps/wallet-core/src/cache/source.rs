//! Self-refreshing cached value source.
//!
//! Composes an [`InMemoryCache`] with an injected remote fetch into a value
//! source that returns fresh data on demand, de-duplicates concurrent
//! fetches per key, and streams updates with a
//! return-stale-then-refresh policy.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use futures::future::{self, BoxFuture, Future, FutureExt, Shared};
use futures::stream::{self, BoxStream, StreamExt};

use super::in_memory::{CacheValue, InMemoryCache};

type FetchFn<K, V, E> = Arc<dyn Fn(K) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;
type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// A cache-backed value source with remote-fetch fallback.
///
/// `get` consults the cache first and only reaches for the injected fetch
/// on an absent or stale entry; concurrent fetches for the same key are
/// coalesced into one remote call whose result every waiter observes.
pub struct CachedValueSource<K, V, E> {
    cache: Arc<InMemoryCache<K, V>>,
    fetch: FetchFn<K, V, E>,
    in_flight: Arc<Mutex<HashMap<K, SharedFetch<V, E>>>>,
}

impl<K, V, E> Clone for CachedValueSource<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            fetch: Arc::clone(&self.fetch),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<K, V, E> CachedValueSource<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wrap a cache and a remote fetch function.
    ///
    /// The fetch must be idempotent-safe to retry; it is invoked at most
    /// once per key at any moment.
    pub fn new<F, Fut>(cache: Arc<InMemoryCache<K, V>>, fetch: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        Self {
            cache,
            fetch: Arc::new(move |key| fetch(key).boxed()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve the value for a key.
    ///
    /// A `Present` cache hit returns immediately with no network access.
    /// `force_fetch` skips the cache read entirely; call sites that must
    /// not show stale data (e.g. right after submitting a transaction) use
    /// it.
    ///
    /// # Errors
    ///
    /// Propagates the remote fetch's error.
    pub async fn get(&self, key: K, force_fetch: bool) -> Result<V, E> {
        if !force_fetch {
            if let CacheValue::Present(value) = self.cache.get(&key) {
                return Ok(value);
            }
        }
        self.fetch_or_join(key, !force_fetch).await
    }

    /// Stream the value for a key.
    ///
    /// Present cache emissions pass straight through. A stale emission is
    /// re-emitted immediately (suppressed when `skip_stale` is set) while
    /// the refresh runs; the fresh value then arrives as a later element of
    /// the same stream. Fetch errors surface as `Err` elements rather than
    /// terminating the stream, so a long-lived listener survives transient
    /// failures.
    pub fn stream(&self, key: K, skip_stale: bool) -> BoxStream<'static, Result<V, E>> {
        let this = self.clone();
        self.cache
            .stream(key.clone())
            .flat_map(move |cache_value| match cache_value {
                CacheValue::Present(value) => stream::once(future::ready(Ok(value))).boxed(),
                CacheValue::Stale(value) if !skip_stale => {
                    stream::once(future::ready(Ok(value)))
                        .chain(this.refresh_surfacing_errors(key.clone()))
                        .boxed()
                }
                CacheValue::Stale(_) | CacheValue::Absent => {
                    this.refresh_surfacing_errors(key.clone()).boxed()
                }
            })
            .boxed()
    }

    /// Kick the fetch-and-store flow; only failures become stream elements.
    /// The fetched value itself re-enters through the cache change feed.
    fn refresh_surfacing_errors(&self, key: K) -> BoxStream<'static, Result<V, E>> {
        let this = self.clone();
        stream::once(async move { this.fetch_or_join(key, true).await })
            .filter_map(|result| {
                future::ready(match result {
                    Ok(_) => None,
                    Err(error) => Some(Err(error)),
                })
            })
            .boxed()
    }

    /// Await the in-flight fetch for a key, starting one if none exists.
    ///
    /// With `respect_cache` set, a fresh value that landed between the
    /// caller's cache read and this lock acquisition is returned without
    /// starting a second fetch.
    async fn fetch_or_join(&self, key: K, respect_cache: bool) -> Result<V, E> {
        let shared = {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            if let Some(existing) = in_flight.get(&key) {
                existing.clone()
            } else {
                if respect_cache {
                    // A fetch may have completed between the caller's cache
                    // read and this lock acquisition.
                    if let CacheValue::Present(value) = self.cache.get(&key) {
                        return Ok(value);
                    }
                }
                let fetch = Arc::clone(&self.fetch);
                let cache = Arc::clone(&self.cache);
                let registry = Arc::clone(&self.in_flight);
                let fetch_key = key.clone();
                let shared = async move {
                    let result = (fetch)(fetch_key.clone()).await;
                    if let Ok(value) = &result {
                        cache.set(value.clone(), fetch_key.clone());
                    }
                    // The entry is cleared exactly once, here, no matter how
                    // many callers are awaiting the shared future.
                    registry
                        .lock()
                        .expect("in-flight lock poisoned")
                        .remove(&fetch_key);
                    result
                }
                .boxed()
                .shared();
                in_flight.insert(key.clone(), shared.clone());
                shared
            }
        };
        shared.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::super::refresh::PeriodicCacheRefreshControl;
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct FetchError;

    const FETCHED: i32 = 100;

    fn source_with(
        interval: Duration,
        calls: Arc<AtomicUsize>,
    ) -> (
        Arc<InMemoryCache<i32, i32>>,
        CachedValueSource<i32, i32, FetchError>,
    ) {
        let cache = Arc::new(InMemoryCache::new(Arc::new(
            PeriodicCacheRefreshControl::new(interval),
        )));
        let source = CachedValueSource::new(Arc::clone(&cache), move |key: i32| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                if key < 0 { Err(FetchError) } else { Ok(FETCHED) }
            }
        });
        (cache, source)
    }

    #[tokio::test]
    async fn get_absent_key_fetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_, source) = source_with(Duration::from_secs(3), Arc::clone(&calls));

        assert_eq!(source.get(0, false).await, Ok(FETCHED));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_present_key_skips_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, source) = source_with(Duration::from_secs(3), Arc::clone(&calls));
        cache.set(7, 0);

        assert_eq!(source.get(0, false).await, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn get_stale_key_fetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, source) = source_with(Duration::from_millis(0), Arc::clone(&calls));
        cache.set(7, 0);

        assert_eq!(source.get(0, false).await, Ok(FETCHED));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_force_fetch_skips_cache_read() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, source) = source_with(Duration::from_secs(3), Arc::clone(&calls));
        cache.set(7, 0);

        assert_eq!(source.get(0, true).await, Ok(FETCHED));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The fetched value replaced the cached one.
        assert_eq!(source.get(0, false).await, Ok(FETCHED));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_error_propagates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, source) = source_with(Duration::from_secs(3), calls);

        assert_eq!(source.get(-1, false).await, Err(FetchError));
        // Errors are not stored.
        assert_eq!(cache.get(&-1), CacheValue::Absent);
    }

    #[tokio::test]
    async fn concurrent_gets_coalesce_into_one_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_, source) = source_with(Duration::from_secs(3), Arc::clone(&calls));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let source = source.clone();
                tokio::spawn(async move { source.get(0, false).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(FETCHED));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_after_resolution_is_fresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, source) = source_with(Duration::from_secs(3), Arc::clone(&calls));

        assert_eq!(source.get(0, false).await, Ok(FETCHED));
        cache.remove(&0);
        assert_eq!(source.get(0, false).await, Ok(FETCHED));
        // The in-flight entry was cleared, so the second get re-fetched.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stream_stale_emits_stale_then_fresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, source) = source_with(Duration::from_millis(40), Arc::clone(&calls));
        cache.set(7, 0);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut stream = Box::pin(source.stream(0, false));
        assert_eq!(stream.next().await, Some(Ok(7)));
        assert_eq!(stream.next().await, Some(Ok(FETCHED)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_skip_stale_suppresses_stale_emission() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, source) = source_with(Duration::from_millis(40), calls);
        cache.set(7, 0);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut stream = Box::pin(source.stream(0, true));
        assert_eq!(stream.next().await, Some(Ok(FETCHED)));
    }

    #[tokio::test]
    async fn stream_present_key_emits_without_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, source) = source_with(Duration::from_secs(3), Arc::clone(&calls));
        cache.set(7, 0);

        let mut stream = Box::pin(source.stream(0, false));
        assert_eq!(stream.next().await, Some(Ok(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stream_error_is_an_element_not_a_termination() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, source) = source_with(Duration::from_secs(3), calls);

        let mut stream = Box::pin(source.stream(-1, false));
        assert_eq!(stream.next().await, Some(Err(FetchError)));

        // The stream is still alive: a later set surfaces normally.
        cache.set(5, -1);
        assert_eq!(stream.next().await, Some(Ok(5)));
    }
}
