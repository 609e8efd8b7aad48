//! # privycache
//!
//! Bounded in-memory cache for optimized avatar images.
//!
//! ## Architecture
//! - **HashMap**: AHash index from fingerprint to slab slot (O(1))
//! - **LRU List**: Intrusive doubly-linked list for eviction order (O(1))
//! - **TTL**: Checked lazily on lookup, no background sweeper
//! - **Locking**: One mutex over index and list together

#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod lru;
mod stats;

pub use cache::AvatarCache;
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use stats::{CacheStats, StatsSnapshot};
