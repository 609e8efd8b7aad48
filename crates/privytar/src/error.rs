//! Error types for privytar

use std::time::Duration;

use privycache::CacheError;

use crate::query::QueryError;

/// Result type alias for avatar resolution
pub type Result<T> = std::result::Result<T, AvatarError>;

/// Why a request could not be answered with image bytes
#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    /// Identifier is not 32 or 64 hexadecimal characters
    #[error("invalid hash format: {0:?}")]
    BadIdentifier(String),

    /// Query string could not be normalized
    #[error("failed to normalize query string: {0}")]
    BadQuery(#[from] QueryError),

    /// Upstream fetch failed after the retry policy ran out
    #[error("failed to fetch avatar from upstream: {0}")]
    UpstreamUnavailable(#[from] FetchError),

    /// The cache reported an inconsistency on the read path
    #[error("internal cache failure: {0}")]
    InternalFailure(#[source] CacheError),
}

impl AvatarError {
    /// HTTP status class the serving layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            AvatarError::BadIdentifier(_) | AvatarError::BadQuery(_) => 400,
            AvatarError::UpstreamUnavailable(_) => 502,
            AvatarError::InternalFailure(_) => 500,
        }
    }

    /// Short message safe to show to the caller
    pub fn public_message(&self) -> &'static str {
        match self {
            AvatarError::BadIdentifier(_) => "Invalid hash format",
            AvatarError::BadQuery(_) => "Failed to normalize query string",
            AvatarError::UpstreamUnavailable(_) => "Failed to fetch Gravatar image",
            AvatarError::InternalFailure(_) => "Failed to get image from cache",
        }
    }
}

/// Failure while downloading or optimizing an upstream image
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Client settings are unusable
    #[error("invalid fetch configuration: {0}")]
    Config(String),

    /// The HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Request could not be issued (bad URL, redirect loop)
    #[error("request rejected: {0}")]
    Request(String),

    /// Connection, send or body read failed
    #[error("upstream connection failed: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Body is not an image the optimizer can read
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// Re-encoding the image failed
    #[error("failed to optimize image: {0}")]
    Optimize(String),

    /// The optimizer task panicked or was cancelled
    #[error("optimizer task failed: {0}")]
    Task(String),

    /// The whole call ran past its deadline
    #[error("upstream fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    /// Whether the retry policy may try again after this error
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status(status) => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Upstream status code, when the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status(status) => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() || err.is_redirect() {
            FetchError::Request(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}
