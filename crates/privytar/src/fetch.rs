//! Rate-limited, retrying upstream client

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::limiter::TokenBucket;
use crate::meta;
use crate::optimize;

/// Anything that can turn a canonical upstream URI into final image bytes.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait AvatarSource: Send + Sync {
    /// Download and optimize the image at `uri`.
    async fn fetch(&self, uri: &str) -> Result<Bytes, FetchError>;
}

/// Settings for [`FetchClient`]
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User-agent product token
    pub service_name: String,
    /// Operator contact shown in the user-agent comment
    pub contact: String,
    /// Sustained outbound request rate
    pub requests_per_second: f64,
    /// Requests allowed back to back before the rate applies
    pub burst: u32,
    /// Extra attempts after a transient failure
    pub max_retries: u32,
    /// Delay before the first retry, doubled after each one
    pub retry_backoff: Duration,
    /// Deadline for a whole `fetch` call, retries and optimization included
    pub timeout: Duration,
    /// JPEG quality for the optimized candidate
    pub jpeg_quality: u8,
}

impl FetchConfig {
    /// Defaults: 2 requests per second, burst of 1, 3 retries, 10s deadline.
    pub fn new(service_name: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            contact: contact.into(),
            requests_per_second: 2.0,
            burst: 1,
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
            timeout: Duration::from_secs(10),
            jpeg_quality: 80,
        }
    }

    /// `<name>/<version> (<contact>)`
    pub fn user_agent(&self) -> String {
        format!("{}/{} ({})", self.service_name, meta::VERSION, self.contact)
    }

    fn validate(&self) -> Result<(), FetchError> {
        if self.service_name.trim().is_empty() {
            return Err(FetchError::Config("service name is empty".into()));
        }
        if !(self.requests_per_second.is_finite() && self.requests_per_second > 0.0) {
            return Err(FetchError::Config(format!(
                "requests per second must be positive, got {}",
                self.requests_per_second
            )));
        }
        if self.burst == 0 {
            return Err(FetchError::Config("burst must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(FetchError::Config("timeout must be positive".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(FetchError::Config(format!(
                "jpeg quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// HTTP client for the upstream avatar provider
pub struct FetchClient {
    http: reqwest::Client,
    limiter: TokenBucket,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a client with default rate, retry and deadline settings.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(
        service_name: impl Into<String>,
        contact: impl Into<String>,
    ) -> Result<Self, FetchError> {
        Self::with_config(FetchConfig::new(service_name, contact))
    }

    /// Create a client from explicit settings.
    ///
    /// # Errors
    /// Returns error if the settings are invalid or the HTTP client cannot be
    /// created.
    pub fn with_config(config: FetchConfig) -> Result<Self, FetchError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            http,
            limiter: TokenBucket::new(config.requests_per_second, config.burst),
            config,
        })
    }

    /// Active settings
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn fetch_and_optimize(&self, uri: &str) -> Result<Bytes, FetchError> {
        let original = self.download(uri).await?;
        let original_len = original.len();
        let quality = self.config.jpeg_quality;

        let chosen = tokio::task::spawn_blocking(move || optimize::smaller_of(original, quality))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))??;

        debug!(
            uri,
            original_len,
            final_len = chosen.len(),
            "fetched avatar from upstream"
        );

        Ok(chosen)
    }

    /// GET with the retry policy applied. Each attempt takes its own token.
    async fn download(&self, uri: &str) -> Result<Bytes, FetchError> {
        let mut attempts = 0;
        let mut backoff = self.config.retry_backoff;

        loop {
            self.limiter.acquire().await;

            match self.attempt(uri).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempts < self.config.max_retries => {
                    attempts += 1;
                    warn!(
                        uri,
                        attempt = attempts,
                        max_retries = self.config.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "upstream fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, uri: &str) -> Result<Bytes, FetchError> {
        let response = self.http.get(uri).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?)
    }
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AvatarSource for FetchClient {
    /// All-or-nothing: any transport, status, decode or optimizer failure
    /// yields an error, and the deadline covers every step.
    async fn fetch(&self, uri: &str) -> Result<Bytes, FetchError> {
        tokio::time::timeout(self.config.timeout, self.fetch_and_optimize(uri))
            .await
            .map_err(|_| FetchError::Timeout(self.config.timeout))?
    }
}
