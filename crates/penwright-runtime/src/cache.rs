//! Caching layer for discovery results.
//!
//! Discovery answers change slowly, so repeated requests for the same topic
//! reuse them instead of spending quota. Only non-empty answers are cached:
//! a failed or empty lookup is retried on the next request.

use moka::future::Cache;
use std::time::Duration;

use penwright_core::Discovered;

use crate::config::CacheSettings;

/// Cache key: discovery service plus normalised topic.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    service: String,
    topic: String,
}

impl CacheKey {
    /// Create a key for `service` and `topic`.
    ///
    /// Topics differing only in case or whitespace share an entry.
    pub fn new(service: &str, topic: &str) -> Self {
        Self {
            service: service.to_string(),
            topic: normalize_topic(topic),
        }
    }
}

fn normalize_topic(topic: &str) -> String {
    topic
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Discovery cache using moka.
#[derive(Clone)]
pub struct DiscoveryCache {
    cache: Cache<CacheKey, Discovered>,
}

impl DiscoveryCache {
    /// Create a new cache with the given capacity and time-to-live.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Cache sized from configuration, or `None` when disabled.
    pub fn from_settings(settings: &CacheSettings) -> Option<Self> {
        settings
            .enabled
            .then(|| Self::new(settings.capacity, settings.ttl))
    }

    /// Get a cached result.
    pub async fn get(&self, key: &CacheKey) -> Option<Discovered> {
        self.cache.get(key).await
    }

    /// Store a result.
    pub async fn insert(&self, key: CacheKey, value: Discovered) {
        self.cache.insert(key, value).await;
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for DiscoveryCache {
    fn default() -> Self {
        let settings = CacheSettings::default();
        Self::new(settings.capacity, settings.ttl)
    }
}

impl std::fmt::Debug for DiscoveryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryCache")
            .field("entries", &self.entry_count())
            .finish()
    }
}
