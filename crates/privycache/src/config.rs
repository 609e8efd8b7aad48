//! Cache sizing and expiry settings

use std::time::Duration;

use crate::error::{CacheError, Result};

/// Validated capacity and TTL for an [`AvatarCache`](crate::AvatarCache).
///
/// There are no built-in defaults; whoever builds the cache decides both
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    capacity: usize,
    ttl: Duration,
}

impl CacheConfig {
    /// Build a config, rejecting a zero capacity or a zero TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }

        if ttl.is_zero() {
            return Err(CacheError::NonPositiveTtl(ttl));
        }

        Ok(Self { capacity, ttl })
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum age since an entry was last touched
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_valid() {
        let config = CacheConfig::new(8192, Duration::from_secs(3600)).unwrap();
        assert_eq!(config.capacity(), 8192);
        assert_eq!(config.ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_config_rejects_zero_capacity() {
        let err = CacheConfig::new(0, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, CacheError::ZeroCapacity);
    }

    #[test]
    fn test_config_rejects_zero_ttl() {
        let err = CacheConfig::new(10, Duration::ZERO).unwrap_err();
        assert_eq!(err, CacheError::NonPositiveTtl(Duration::ZERO));
    }
}
