//! In-process cache store.
//!
//! [`MemoryCacheStore`] keeps entries in moka's async LRU + TTL cache. It
//! never fails, so it is the default store when the host does not inject
//! its own (e.g. a remote document store).

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use super::{CacheEntry, CacheKey, CacheStore};
use crate::Result;

/// Configuration for the in-process store.
///
/// ```rust
/// # use sanad::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
    /// Time-to-live for cached entries. Default: 24 hours.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Bounded in-memory [`CacheStore`]. A later save for the same key replaces
/// the earlier entry.
pub struct MemoryCacheStore {
    cache: Cache<CacheKey, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self { cache }
    }

    /// Full stored entry, including model and write time.
    pub async fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.cache.get(key).await
    }

    /// Number of live entries after pending maintenance has run.
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn lookup(&self, key: &CacheKey) -> Result<Option<serde_json::Value>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn save(&self, entry: CacheEntry) -> Result<()> {
        self.cache.insert(entry.key, entry).await;
        Ok(())
    }
}
