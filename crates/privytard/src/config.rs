//! Daemon configuration file

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use privytar::meta;
use serde::Deserialize;
use url::Url;

/// Default listen address
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:1997";

/// Default number of cached images
pub const DEFAULT_CACHE_CAPACITY: usize = 8192;

/// Default cache entry lifetime
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Public identity of the service
    pub service: ServiceConfig,
    /// Listener and cache settings
    pub server: ServerConfig,
}

/// Public identity of the service
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Name used in the upstream user agent
    pub name: String,
    /// Where `/` and `/avatar/` redirect
    pub homepage: String,
    /// Operator contact, sent upstream in the user agent
    pub contact: String,
    /// Sent in the `Privacy-Policy` response header
    pub privacy_policy: String,
    /// Sent in the `Terms-Of-Service` response header
    pub terms_of_service: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: meta::NAME.to_string(),
            homepage: meta::HOMEPAGE.to_string(),
            contact: String::new(),
            privacy_policy: String::new(),
            terms_of_service: String::new(),
        }
    }
}

/// Listener and cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// `host:port` to listen on
    pub address: String,
    /// Maximum number of cached images
    pub cache_capacity: usize,
    /// Lifetime of a cached image since it was last touched
    #[serde(rename = "cacheTTL", deserialize_with = "crate::duration::deserialize")]
    pub cache_ttl: Duration,
    /// Upstream avatar endpoint
    pub upstream: String,
    /// Emit one log line per request
    pub log_requests: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            upstream: meta::GRAVATAR_AVATAR_BASE.to_string(),
            log_requests: false,
        }
    }
}

impl Config {
    /// Read, fill in defaults and validate the file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse, fill in defaults and validate a JSON document
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(raw)?;
        config.fill_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Empty strings, a zero capacity and a zero TTL count as unset
    fn fill_defaults(&mut self) {
        let defaults = Config::default();

        if self.service.name.is_empty() {
            self.service.name = defaults.service.name;
        }
        if self.service.homepage.is_empty() {
            self.service.homepage = defaults.service.homepage;
        }
        if self.server.address.is_empty() {
            self.server.address = defaults.server.address;
        }
        if self.server.cache_capacity == 0 {
            self.server.cache_capacity = defaults.server.cache_capacity;
        }
        if self.server.cache_ttl.is_zero() {
            self.server.cache_ttl = defaults.server.cache_ttl;
        }
        if self.server.upstream.is_empty() {
            self.server.upstream = defaults.server.upstream;
        }
    }

    /// Check required fields and URL shapes
    pub fn validate(&self) -> Result<()> {
        if self.service.contact.trim().is_empty() {
            bail!("service contact information is missing");
        }
        if self.service.privacy_policy.trim().is_empty() {
            bail!("service privacy policy is missing");
        }
        if self.service.terms_of_service.trim().is_empty() {
            bail!("service terms of service is missing");
        }

        check_url("service homepage", &self.service.homepage)?;
        check_url("service privacy policy", &self.service.privacy_policy)?;
        check_url("service terms of service", &self.service.terms_of_service)?;
        check_url("server upstream", &self.server.upstream)?;

        Ok(())
    }
}

fn check_url(field: &str, value: &str) -> Result<()> {
    Url::parse(value).with_context(|| format!("{field} is not a valid URL: {value:?}"))?;
    Ok(())
}
