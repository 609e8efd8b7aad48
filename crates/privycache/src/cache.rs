//! AvatarCache: concurrent TTL-bounded LRU over image bytes

use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::lru::{Dangling, Lookup, LruCache};
use crate::stats::CacheStats;

/// In-memory cache mapping fingerprints to optimized image bytes.
///
/// One mutex guards the index and the recency list together, so `get`, `set`
/// and `delete` are atomic with respect to each other. Nothing inside the
/// critical section does I/O.
///
/// Expiry is lazy: a stale entry stays in memory until it is looked up or
/// pushed out by capacity pressure. Eviction always takes the least recently
/// touched entry, stale or not.
pub struct AvatarCache {
    /// Recency list for stored images
    entries: Mutex<LruCache<String, Bytes>>,

    /// Cache statistics
    stats: CacheStats,

    /// Capacity and TTL
    config: CacheConfig,
}

impl AvatarCache {
    /// Create a cache holding at most `capacity` entries for `ttl` each
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries, must be non-zero
    /// * `ttl` - Maximum age since last touch, must be non-zero
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self> {
        Ok(Self::with_config(CacheConfig::new(capacity, ttl)?))
    }

    /// Create a cache from an already validated config
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity())),
            stats: CacheStats::default(),
            config,
        }
    }

    /// Get the bytes stored under `key`.
    ///
    /// A hit promotes the entry to most recently used. A stale entry is
    /// removed before `CacheError::Expired` is returned, so the next lookup
    /// reports `CacheError::NotFound`.
    pub fn get(&self, key: &str) -> Result<Bytes> {
        let lookup = {
            let mut entries = self.entries.lock();
            entries.get(key, self.config.ttl(), Instant::now())
        };

        match lookup {
            Ok(Lookup::Hit(value)) => {
                self.stats.record_hit();
                trace!(key, "cache hit");
                Ok(value)
            }
            Ok(Lookup::Missing) => {
                self.stats.record_miss();
                trace!(key, "cache miss");
                Err(CacheError::NotFound(key.to_string()))
            }
            Ok(Lookup::Expired) => {
                self.stats.record_expiration();
                debug!(key, "cache entry expired");
                Err(CacheError::Expired(key.to_string()))
            }
            Err(Dangling) => Err(CacheError::Corrupted(key.to_string())),
        }
    }

    /// Store `value` under `key`.
    ///
    /// A new key at full capacity evicts the least recently used entry
    /// first. An existing key gets the new value, a fresh timestamp and the
    /// front of the recency list, without evicting anything.
    pub fn set(&self, key: impl Into<String>, value: Bytes) -> Result<()> {
        let key = key.into();

        let outcome = {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries
                .put(key.clone(), value, Instant::now())
                .map(|evicted| (evicted, entries.len() > before))
        };

        let (evicted, inserted) = outcome.map_err(|Dangling| CacheError::Corrupted(key.clone()))?;

        if let Some(evicted) = &evicted {
            self.stats.record_eviction();
            debug!(key = %evicted, "evicted least recently used entry");
        }

        if inserted || evicted.is_some() {
            self.stats.record_insert();
        }

        trace!(key = %key, "cache store");
        Ok(())
    }

    /// Remove `key`, returning its bytes when it was present.
    ///
    /// Removing an absent key is a no-op and returns `None`.
    pub fn delete(&self, key: &str) -> Option<Bytes> {
        self.entries.lock().remove(key)
    }

    /// Number of entries currently held, stale ones included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    /// Entry lifetime since last touch
    pub fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Drop every entry and reset statistics
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.stats.reset();
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        self.entries.lock().assert_consistent();
    }
}

impl std::fmt::Debug for AvatarCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarCache")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
