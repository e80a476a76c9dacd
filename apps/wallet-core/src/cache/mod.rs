//! Generic value caching with staleness semantics.
//!
//! The cache layer has three pieces:
//!
//! - [`InMemoryCache`]: a passive key/value store whose reads are tagged
//!   `Absent` / `Stale` / `Present` by a pluggable refresh policy.
//! - [`CachedValueSource`]: the composition of a cache with a remote fetch,
//!   adding per-key request de-duplication and the
//!   return-stale-then-refresh streaming policy.
//! - [`FlushBus`]: named process-wide signals (logout, transaction
//!   submitted) that evict subscribed caches during session teardown.

mod flush;
mod in_memory;
mod refresh;
mod source;

pub use flush::{FlushBus, FlushNotification};
pub use in_memory::{CacheConfiguration, CacheValue, InMemoryCache};
pub use refresh::{CacheRefreshControl, PeriodicCacheRefreshControl};
pub use source::CachedValueSource;
