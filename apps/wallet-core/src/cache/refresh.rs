//! Staleness policies for cached entries.

use std::time::{Duration, Instant};

/// Decides whether a cached entry is due for a refresh.
///
/// Injected per cache instance so different data classes (balances vs
/// remote configuration) can carry different staleness windows.
pub trait CacheRefreshControl: Send + Sync {
    /// True when an entry refreshed at `last_refresh` should be treated as
    /// stale.
    fn should_refresh(&self, last_refresh: Instant) -> bool;
}

/// Marks entries stale once a fixed interval has elapsed.
#[derive(Debug, Clone)]
pub struct PeriodicCacheRefreshControl {
    refresh_interval: Duration,
}

impl PeriodicCacheRefreshControl {
    /// Create a control with the given staleness window.
    #[must_use]
    pub const fn new(refresh_interval: Duration) -> Self {
        Self { refresh_interval }
    }
}

impl CacheRefreshControl for PeriodicCacheRefreshControl {
    fn should_refresh(&self, last_refresh: Instant) -> bool {
        last_refresh.elapsed() >= self.refresh_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_not_refreshed() {
        let control = PeriodicCacheRefreshControl::new(Duration::from_secs(60));
        assert!(!control.should_refresh(Instant::now()));
    }

    #[test]
    fn entry_older_than_interval_is_refreshed() {
        let control = PeriodicCacheRefreshControl::new(Duration::from_millis(0));
        assert!(control.should_refresh(Instant::now()));
    }
}
