//! Cache key derivation

use sha2::{Digest, Sha256};

/// Width of every fingerprint, in hex characters
pub const FINGERPRINT_LEN: usize = 64;

/// SHA-256 of the canonical upstream URI, lowercase hex.
pub fn fingerprint(canonical_uri: &str) -> String {
    hex::encode(Sha256::digest(canonical_uri.as_bytes()))
}
