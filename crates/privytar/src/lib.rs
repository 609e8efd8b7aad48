//! # privytar
//!
//! Privacy-preserving avatar proxy core.
//!
//! ## Request path
//! - **Validate**: identifier must be 32 or 64 hex characters
//! - **Normalize**: query decoded, stably sorted by key, re-encoded
//! - **Fingerprint**: SHA-256 of the canonical upstream URI
//! - **Lookup**: [`privycache::AvatarCache`], expired entries count as misses
//! - **Fetch**: rate-limited, retried, recompressed when that makes it smaller
//! - **Store**: best effort; a failed store never fails the request

#![warn(missing_docs)]

mod avatar;
mod error;
mod fetch;
mod fingerprint;
mod identifier;
mod limiter;
pub mod meta;
mod optimize;
mod query;

pub use avatar::{Avatar, AvatarService};
pub use error::{AvatarError, FetchError, Result};
pub use fetch::{AvatarSource, FetchClient, FetchConfig};
pub use fingerprint::{fingerprint, FINGERPRINT_LEN};
pub use identifier::{is_valid_identifier, AvatarId, MD5_HEX_LEN, SHA256_HEX_LEN};
pub use optimize::{recompress, smaller_of};
pub use query::{normalize_query, QueryError};
