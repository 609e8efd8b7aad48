//! Avatar identifier validation

use std::fmt;

use crate::error::AvatarError;

/// Length of a hex-encoded MD5 digest
pub const MD5_HEX_LEN: usize = 32;

/// Length of a hex-encoded SHA-256 digest
pub const SHA256_HEX_LEN: usize = 64;

/// True when `candidate` is exactly 32 or 64 hex digits, either case.
pub fn is_valid_identifier(candidate: &str) -> bool {
    matches!(candidate.len(), MD5_HEX_LEN | SHA256_HEX_LEN)
        && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A validated content hash, stored lowercase.
///
/// Gravatar treats hashes case-insensitively, so lowercasing lets `ABCD…`
/// and `abcd…` share one cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AvatarId(String);

impl AvatarId {
    /// Validate a path segment as an avatar identifier
    pub fn parse(candidate: &str) -> Result<Self, AvatarError> {
        if !is_valid_identifier(candidate) {
            return Err(AvatarError::BadIdentifier(candidate.to_string()));
        }

        Ok(Self(candidate.to_ascii_lowercase()))
    }

    /// The lowercase hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AvatarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("deadbeefdeadbeefdeadbeefdeadbeef" ; "md5 lowercase")]
    #[test_case("DEADBEEFDEADBEEFDEADBEEFDEADBEEF" ; "md5 uppercase")]
    #[test_case("c9fb2194c5e620c85b10840bc63121fd984ed86e91bc819d5dad7baf1168e5c1" ; "sha256")]
    #[test_case("C9fb2194C5e620c85b10840bc63121fd984ed86e91bc819d5dad7baf1168e5C1" ; "sha256 mixed case")]
    fn test_accepts(candidate: &str) {
        assert!(is_valid_identifier(candidate));
    }

    #[test_case("" ; "empty")]
    #[test_case("not-hex!!" ; "punctuation")]
    #[test_case("deadbeefdeadbeefdeadbeefdeadbee" ; "31 chars")]
    #[test_case("deadbeefdeadbeefdeadbeefdeadbeef0" ; "33 chars")]
    #[test_case("deadbeefdeadbeefdeadbeefdeadbeeg" ; "non hex letter")]
    #[test_case("deadbeefdeadbeefdeadbeefdeadbee\u{e9}" ; "multibyte char")]
    fn test_rejects(candidate: &str) {
        assert!(!is_valid_identifier(candidate));
    }

    #[test]
    fn test_parse_lowercases() {
        let id = AvatarId::parse("DEADBEEFDEADBEEFDEADBEEFDEADBEEF").unwrap();
        assert_eq!(id.as_str(), "deadbeefdeadbeefdeadbeefdeadbeef");
    }

    #[test]
    fn test_parse_rejects() {
        let err = AvatarId::parse("not-hex!!").unwrap_err();
        assert!(matches!(err, AvatarError::BadIdentifier(s) if s == "not-hex!!"));
    }
}
