//! In-memory key/value cache with staleness tagging.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::flush::{FlushBus, FlushNotification};
use super::refresh::CacheRefreshControl;

/// Capacity of the per-cache change feed. Slow stream consumers that fall
/// further behind than this observe a gap, not a stall of writers.
const CHANGE_FEED_CAPACITY: usize = 256;

/// The freshness of a cached entry at read time.
///
/// `Stale` and `Present` always carry the last successfully stored value;
/// only the tag changes as time passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue<V> {
    /// Nothing was ever stored for the key.
    Absent,
    /// A value is stored but is older than the refresh threshold.
    Stale(V),
    /// A value is stored and fresh.
    Present(V),
}

impl<V> CacheValue<V> {
    /// The carried value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&V> {
        match self {
            Self::Absent => None,
            Self::Stale(value) | Self::Present(value) => Some(value),
        }
    }

    /// True for the `Present` tag.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// True for the `Stale` tag.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// Configures which flush signals evict a cache.
#[derive(Debug, Clone, Default)]
pub struct CacheConfiguration {
    flush_notifications: Vec<FlushNotification>,
}

impl CacheConfiguration {
    /// A cache that never flushes on process-wide signals.
    #[must_use]
    pub const fn standalone() -> Self {
        Self {
            flush_notifications: Vec::new(),
        }
    }

    /// A cache flushed when the user logs out.
    #[must_use]
    pub fn on_logout() -> Self {
        Self::flushed_by(vec![FlushNotification::UserLoggedOut])
    }

    /// A cache flushed by the given signals.
    #[must_use]
    pub fn flushed_by(flush_notifications: Vec<FlushNotification>) -> Self {
        Self {
            flush_notifications,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    last_refresh: Instant,
}

#[derive(Debug, Clone)]
enum ChangeEvent<K, V> {
    Updated {
        key: K,
        value: V,
        refreshed: Instant,
    },
    Removed {
        key: K,
    },
    Cleared,
}

struct CacheState<K, V> {
    store: Mutex<HashMap<K, CacheEntry<V>>>,
    changes: broadcast::Sender<ChangeEvent<K, V>>,
}

impl<K, V> CacheState<K, V> {
    fn remove_all(&self) {
        let mut store = self.store.lock().expect("cache lock poisoned");
        store.clear();
        drop(store);
        let _ = self.changes.send(ChangeEvent::Cleared);
    }
}

/// An in-memory cache keyed by `K`.
///
/// Reads classify entries through the injected [`CacheRefreshControl`];
/// [`InMemoryCache::stream`] replays the current state to every new
/// subscriber and then follows changes, deduplicated by equality. One lock
/// per cache instance guards the backing store, and the lock is never held
/// across an await point or a subscriber callback.
pub struct InMemoryCache<K, V> {
    state: Arc<CacheState<K, V>>,
    refresh_control: Arc<dyn CacheRefreshControl>,
}

impl<K, V> InMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a cache with the given staleness policy.
    #[must_use]
    pub fn new(refresh_control: Arc<dyn CacheRefreshControl>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            state: Arc::new(CacheState {
                store: Mutex::new(HashMap::new()),
                changes,
            }),
            refresh_control,
        }
    }

    /// Create a cache wired to flush on the configured process-wide signals.
    ///
    /// Must be called from within a tokio runtime when the configuration
    /// names any flush notification.
    #[must_use]
    pub fn with_flush_bus(
        configuration: &CacheConfiguration,
        refresh_control: Arc<dyn CacheRefreshControl>,
        bus: &FlushBus,
    ) -> Self {
        let cache = Self::new(refresh_control);
        if !configuration.flush_notifications.is_empty() {
            let names = configuration.flush_notifications.clone();
            let state: Weak<CacheState<K, V>> = Arc::downgrade(&cache.state);
            let mut receiver = bus.subscribe();
            tokio::spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(notification) if names.contains(&notification) => {
                            let Some(state) = state.upgrade() else { break };
                            tracing::debug!(?notification, "flushing cache");
                            state.remove_all();
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
        cache
    }

    /// Read the value for a key, tagged with its freshness. No side effects.
    #[must_use]
    pub fn get(&self, key: &K) -> CacheValue<V> {
        let store = self.state.store.lock().expect("cache lock poisoned");
        match store.get(key) {
            None => CacheValue::Absent,
            Some(entry) => self.classify(entry.value.clone(), entry.last_refresh),
        }
    }

    /// Store a value, returning the previously stored one if any.
    pub fn set(&self, value: V, key: K) -> Option<V> {
        let refreshed = Instant::now();
        let previous = {
            let mut store = self.state.store.lock().expect("cache lock poisoned");
            store.insert(
                key.clone(),
                CacheEntry {
                    value: value.clone(),
                    last_refresh: refreshed,
                },
            )
        };
        let _ = self.state.changes.send(ChangeEvent::Updated {
            key,
            value,
            refreshed,
        });
        previous.map(|entry| entry.value)
    }

    /// Remove the value for a key, returning it if it was stored.
    pub fn remove(&self, key: &K) -> Option<V> {
        let previous = {
            let mut store = self.state.store.lock().expect("cache lock poisoned");
            store.remove(key)
        };
        if previous.is_some() {
            let _ = self.state.changes.send(ChangeEvent::Removed { key: key.clone() });
        }
        previous.map(|entry| entry.value)
    }

    /// Remove every entry.
    pub fn remove_all(&self) {
        self.state.remove_all();
    }

    /// Stream the value for a key: the current state first, then every
    /// subsequent change, deduplicated by equality of the whole
    /// [`CacheValue`].
    ///
    /// The stream never terminates; a new subscription re-emits current
    /// state rather than resuming an old one.
    pub fn stream(&self, key: K) -> BoxStream<'static, CacheValue<V>> {
        // Subscribe before the initial read so no update can fall between
        // the snapshot and the feed.
        let receiver = self.state.changes.subscribe();
        let current = self.get(&key);
        let refresh_control = Arc::clone(&self.refresh_control);

        let updates = BroadcastStream::new(receiver).filter_map(move |event| {
            future::ready(match event {
                Ok(ChangeEvent::Updated {
                    key: event_key,
                    value,
                    refreshed,
                }) if event_key == key => Some(if refresh_control.should_refresh(refreshed) {
                    CacheValue::Stale(value)
                } else {
                    CacheValue::Present(value)
                }),
                Ok(ChangeEvent::Removed { key: event_key }) if event_key == key => {
                    Some(CacheValue::Absent)
                }
                Ok(ChangeEvent::Cleared) => Some(CacheValue::Absent),
                _ => None,
            })
        });

        let mut last: Option<CacheValue<V>> = None;
        stream::once(future::ready(current))
            .chain(updates)
            .filter_map(move |value| {
                future::ready(if last.as_ref() == Some(&value) {
                    None
                } else {
                    last = Some(value.clone());
                    Some(value)
                })
            })
            .boxed()
    }

    fn classify(&self, value: V, last_refresh: Instant) -> CacheValue<V> {
        if self.refresh_control.should_refresh(last_refresh) {
            CacheValue::Stale(value)
        } else {
            CacheValue::Present(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::refresh::PeriodicCacheRefreshControl;
    use super::*;

    fn cache_with_interval(interval: Duration) -> InMemoryCache<i32, i32> {
        InMemoryCache::new(Arc::new(PeriodicCacheRefreshControl::new(interval)))
    }

    #[test]
    fn get_absent_key() {
        let cache = cache_with_interval(Duration::from_secs(3));
        assert_eq!(cache.get(&0), CacheValue::Absent);
    }

    #[test]
    fn get_present_key() {
        let cache = cache_with_interval(Duration::from_secs(3));
        cache.set(10, 0);
        assert_eq!(cache.get(&0), CacheValue::Present(10));
    }

    #[test]
    fn get_stale_key() {
        let cache = cache_with_interval(Duration::from_millis(0));
        cache.set(10, 0);
        assert_eq!(cache.get(&0), CacheValue::Stale(10));
    }

    #[test]
    fn set_returns_replaced_value() {
        let cache = cache_with_interval(Duration::from_secs(3));
        assert_eq!(cache.set(1, 0), None);
        assert_eq!(cache.set(2, 0), Some(1));
        assert_eq!(cache.get(&0), CacheValue::Present(2));
    }

    #[test]
    fn remove_returns_removed_value() {
        let cache = cache_with_interval(Duration::from_secs(3));
        assert_eq!(cache.remove(&0), None);
        cache.set(1, 0);
        assert_eq!(cache.remove(&0), Some(1));
        assert_eq!(cache.get(&0), CacheValue::Absent);
    }

    #[test]
    fn remove_all_evicts_every_key() {
        let cache = cache_with_interval(Duration::from_secs(3));
        cache.set(1, 0);
        cache.set(2, 1);
        cache.remove_all();
        assert_eq!(cache.get(&0), CacheValue::Absent);
        assert_eq!(cache.get(&1), CacheValue::Absent);
    }

    #[tokio::test]
    async fn stream_replays_current_then_updates() {
        let cache = cache_with_interval(Duration::from_secs(3));
        let mut stream = Box::pin(cache.stream(0));

        assert_eq!(stream.next().await, Some(CacheValue::Absent));

        cache.set(1, 0);
        // Updates to other keys must not surface on this stream.
        cache.set(9, 5);
        cache.set(2, 0);

        assert_eq!(stream.next().await, Some(CacheValue::Present(1)));
        assert_eq!(stream.next().await, Some(CacheValue::Present(2)));
    }

    #[tokio::test]
    async fn stream_deduplicates_equal_values() {
        let cache = cache_with_interval(Duration::from_secs(3));
        cache.set(1, 0);
        let mut stream = Box::pin(cache.stream(0));

        assert_eq!(stream.next().await, Some(CacheValue::Present(1)));

        cache.set(1, 0);
        cache.set(2, 0);

        // The repeated Present(1) is swallowed.
        assert_eq!(stream.next().await, Some(CacheValue::Present(2)));
    }

    #[tokio::test]
    async fn stream_observes_removal() {
        let cache = cache_with_interval(Duration::from_secs(3));
        cache.set(1, 0);
        let mut stream = Box::pin(cache.stream(0));

        assert_eq!(stream.next().await, Some(CacheValue::Present(1)));
        cache.remove(&0);
        assert_eq!(stream.next().await, Some(CacheValue::Absent));
    }

    #[tokio::test]
    async fn flush_notification_clears_cache() {
        let bus = FlushBus::new();
        let cache: InMemoryCache<i32, i32> = InMemoryCache::with_flush_bus(
            &CacheConfiguration::on_logout(),
            Arc::new(PeriodicCacheRefreshControl::new(Duration::from_secs(3))),
            &bus,
        );
        cache.set(1, 0);

        bus.post(FlushNotification::UserLoggedOut);
        // Give the flush task a chance to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.get(&0), CacheValue::Absent);
    }

    #[tokio::test]
    async fn unrelated_flush_notification_is_ignored() {
        let bus = FlushBus::new();
        let cache: InMemoryCache<i32, i32> = InMemoryCache::with_flush_bus(
            &CacheConfiguration::on_logout(),
            Arc::new(PeriodicCacheRefreshControl::new(Duration::from_secs(3))),
            &bus,
        );
        cache.set(1, 0);

        bus.post(FlushNotification::TransactionSubmitted);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.get(&0), CacheValue::Present(1));
    }

    #[test]
    fn staleness_window_boundary() {
        // A value set now is Present within the window and Stale at or
        // after its end.
        let cache = cache_with_interval(Duration::from_millis(50));
        cache.set(7, 0);
        assert_eq!(cache.get(&0), CacheValue::Present(7));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get(&0), CacheValue::Stale(7));
    }
}
