//! Error types for privycache

use std::time::Duration;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Why a cache operation did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Key is not in the cache
    #[error("key not found: {0}")]
    NotFound(String),

    /// Key was present but older than the TTL; it has been removed
    #[error("key expired: {0}")]
    Expired(String),

    /// The index pointed at an empty slot in the recency list.
    ///
    /// Unreachable while slots and index entries are only vacated together;
    /// kept so a broken invariant fails the request instead of panicking.
    #[error("cache index corrupted at key: {0}")]
    Corrupted(String),

    /// Capacity must be at least one entry
    #[error("cache capacity must be greater than zero")]
    ZeroCapacity,

    /// TTL must be a strictly positive duration
    #[error("cache TTL must be positive, got {0:?}")]
    NonPositiveTtl(Duration),
}

impl CacheError {
    /// True for the two outcomes a caller should treat as a plain miss
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::NotFound(_) | CacheError::Expired(_))
    }
}
