//! Request orchestration: validate, canonicalize, look up, fetch, store

use std::sync::Arc;

use bytes::Bytes;
use privycache::AvatarCache;
use tracing::{debug, error, warn};

use crate::error::{AvatarError, Result};
use crate::fetch::AvatarSource;
use crate::fingerprint::fingerprint;
use crate::identifier::AvatarId;
use crate::query::normalize_query;

/// A resolved avatar and the metadata the HTTP layer puts in its headers
#[derive(Debug, Clone)]
pub struct Avatar {
    identifier: AvatarId,
    canonical_uri: String,
    bytes: Bytes,
}

impl Avatar {
    /// Served content type
    pub const CONTENT_TYPE: &'static str = "image/jpeg";

    /// Validated, lowercased identifier
    pub fn identifier(&self) -> &AvatarId {
        &self.identifier
    }

    /// Upstream URI the bytes were (or would be) fetched from
    pub fn canonical_uri(&self) -> &str {
        &self.canonical_uri
    }

    /// Image bytes
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consume into the image bytes
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// `Content-Type` value
    pub fn content_type(&self) -> &'static str {
        Self::CONTENT_TYPE
    }

    /// `Content-Disposition` value: inline, named after the identifier
    pub fn content_disposition(&self) -> String {
        format!("inline; filename=\"{}.jpg\"", self.identifier)
    }

    /// `Link` value pointing at the canonical upstream URI
    pub fn canonical_link(&self) -> String {
        format!("<{}>; rel=\"canonical\"", self.canonical_uri)
    }
}

/// Coordinates the validator, normalizer, cache and upstream source.
///
/// Holds no per-request state; build one and share it across requests.
/// Concurrent misses on the same fingerprint each fetch independently;
/// the source's rate limiter bounds how many reach the upstream.
pub struct AvatarService {
    homepage: String,
    upstream: String,
    source: Arc<dyn AvatarSource>,
    cache: Arc<AvatarCache>,
}

impl AvatarService {
    /// Create a service.
    ///
    /// # Arguments
    /// * `homepage` - Where empty identifiers are redirected
    /// * `upstream` - Base the identifier is appended to; a missing trailing
    ///   `/` is added
    /// * `source` - Fetches and optimizes upstream images
    /// * `cache` - Shared image cache
    pub fn new(
        homepage: impl Into<String>,
        upstream: impl Into<String>,
        source: Arc<dyn AvatarSource>,
        cache: Arc<AvatarCache>,
    ) -> Self {
        let mut upstream = upstream.into();
        if !upstream.ends_with('/') {
            upstream.push('/');
        }

        Self {
            homepage: homepage.into(),
            upstream,
            source,
            cache,
        }
    }

    /// Canonical homepage
    pub fn homepage(&self) -> &str {
        &self.homepage
    }

    /// Upstream base, always ending in `/`
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Shared cache handle
    pub fn cache(&self) -> &AvatarCache {
        &self.cache
    }

    /// `<upstream><identifier>`, plus `?<query>` when the query is non-empty
    pub fn canonical_uri(&self, identifier: &AvatarId, canonical_query: &str) -> String {
        if canonical_query.is_empty() {
            format!("{}{}", self.upstream, identifier)
        } else {
            format!("{}{}?{}", self.upstream, identifier, canonical_query)
        }
    }

    /// Resolve one request to image bytes.
    ///
    /// The identifier is checked before the query, and both before the
    /// cache or the network is touched. A failed cache store after a
    /// successful fetch is logged and the bytes are still returned.
    pub async fn resolve(&self, identifier: &str, raw_query: &str) -> Result<Avatar> {
        let identifier = AvatarId::parse(identifier)?;
        let query = normalize_query(raw_query)?;
        let canonical_uri = self.canonical_uri(&identifier, &query);
        let key = fingerprint(&canonical_uri);

        match self.cache.get(&key) {
            Ok(bytes) => {
                debug!(%identifier, key = %key, "serving avatar from cache");
                return Ok(Avatar {
                    identifier,
                    canonical_uri,
                    bytes,
                });
            }
            Err(e) if e.is_miss() => {}
            // Only `Corrupted` lands here, which the cache never produces
            // while its index and recency list are updated together.
            Err(e) => {
                error!(%identifier, key = %key, error = %e, "cache lookup failed");
                return Err(AvatarError::InternalFailure(e));
            }
        }

        let bytes = match self.source.fetch(&canonical_uri).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(uri = %canonical_uri, error = %e, "failed to fetch avatar");
                return Err(e.into());
            }
        };

        if let Err(e) = self.cache.set(key, bytes.clone()) {
            warn!(uri = %canonical_uri, error = %e, "failed to cache avatar");
        }

        Ok(Avatar {
            identifier,
            canonical_uri,
            bytes,
        })
    }
}

impl std::fmt::Debug for AvatarService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarService")
            .field("homepage", &self.homepage)
            .field("upstream", &self.upstream)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::{FetchClient, FetchConfig};
    use crate::optimize::fixtures::tiny_png;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    const ID: &str = "deadbeefdeadbeefdeadbeefdeadbeef";
    const BASE: &str = "https://avatars.test/avatar/";

    /// Counts calls and answers with fixed bytes or a fixed status
    struct FakeSource {
        calls: AtomicUsize,
        status: Option<u16>,
        gate: Option<Barrier>,
    }

    impl FakeSource {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                status: None,
                gate: None,
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                status: Some(status),
                gate: None,
            })
        }

        fn gated(parties: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                status: None,
                gate: Some(Barrier::new(parties)),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AvatarSource for FakeSource {
        async fn fetch(&self, uri: &str) -> std::result::Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.wait().await;
            }
            match self.status {
                Some(status) => Err(FetchError::Status(status)),
                None => Ok(Bytes::from(format!("image for {uri}"))),
            }
        }
    }

    fn service(source: Arc<FakeSource>) -> (AvatarService, Arc<AvatarCache>) {
        let cache = Arc::new(AvatarCache::new(16, Duration::from_secs(60)).unwrap());
        let service = AvatarService::new("https://home.test/", BASE, source, Arc::clone(&cache));
        (service, cache)
    }

    #[tokio::test]
    async fn test_bad_identifier_touches_nothing() {
        let source = FakeSource::ok();
        let (service, cache) = service(Arc::clone(&source));

        let err = service.resolve("not-hex!!", "s=80").await.unwrap_err();

        assert!(matches!(err, AvatarError::BadIdentifier(_)));
        assert_eq!(source.calls(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().snapshot().misses, 0);
    }

    #[tokio::test]
    async fn test_identifier_checked_before_query() {
        let source = FakeSource::ok();
        let (service, _) = service(Arc::clone(&source));

        let err = service.resolve("nope", "a=%zz").await.unwrap_err();

        assert!(matches!(err, AvatarError::BadIdentifier(_)));
    }

    #[tokio::test]
    async fn test_bad_query_touches_nothing() {
        let source = FakeSource::ok();
        let (service, cache) = service(Arc::clone(&source));

        let err = service.resolve(ID, "a=1;b=2").await.unwrap_err();

        assert!(matches!(err, AvatarError::BadQuery(_)));
        assert_eq!(err.status_code(), 400);
        assert_eq!(source.calls(), 0);
        assert_eq!(cache.stats().snapshot().misses, 0);
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let source = FakeSource::ok();
        let (service, cache) = service(Arc::clone(&source));

        let first = service.resolve(ID, "s=80").await.unwrap();
        let second = service.resolve(ID, "s=80").await.unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(first.bytes(), second.bytes());
        assert_eq!(cache.len(), 1);

        let stats = cache.stats().snapshot();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_prepopulated_entry_skips_fetch() {
        let source = FakeSource::ok();
        let (service, cache) = service(Arc::clone(&source));

        let uri = format!("{BASE}{ID}?s=80");
        cache
            .set(fingerprint(&uri), Bytes::from_static(b"cached"))
            .unwrap();

        let avatar = service.resolve(ID, "s=80").await.unwrap();

        assert_eq!(avatar.bytes().as_ref(), b"cached");
        assert_eq!(avatar.canonical_uri(), uri);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_not_cached() {
        let source = FakeSource::failing(404);
        let (service, cache) = service(Arc::clone(&source));

        let err = service.resolve(ID, "").await.unwrap_err();

        assert!(matches!(
            err,
            AvatarError::UpstreamUnavailable(FetchError::Status(404))
        ));
        assert_eq!(err.status_code(), 502);
        assert!(cache.is_empty());

        service.resolve(ID, "").await.unwrap_err();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_query_order_shares_slot() {
        let source = FakeSource::ok();
        let (service, cache) = service(Arc::clone(&source));

        let a = service.resolve(ID, "s=80&d=mp").await.unwrap();
        let b = service.resolve(ID, "d=mp&s=80").await.unwrap();

        assert_eq!(a.canonical_uri(), format!("{BASE}{ID}?d=mp&s=80"));
        assert_eq!(a.canonical_uri(), b.canonical_uri());
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_identifier_case_shares_slot() {
        let source = FakeSource::ok();
        let (service, _) = service(Arc::clone(&source));

        service.resolve(&ID.to_uppercase(), "").await.unwrap();
        let avatar = service.resolve(ID, "").await.unwrap();

        assert_eq!(avatar.canonical_uri(), format!("{BASE}{ID}"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let source = FakeSource::ok();
        let cache = Arc::new(AvatarCache::new(4, Duration::from_millis(20)).unwrap());
        let service = AvatarService::new(
            "https://home.test/",
            BASE,
            Arc::clone(&source) as Arc<dyn AvatarSource>,
            Arc::clone(&cache),
        );

        service.resolve(ID, "").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        service.resolve(ID, "").await.unwrap();

        assert_eq!(source.calls(), 2);
        assert_eq!(cache.stats().snapshot().expirations, 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_both_fetch() {
        let source = FakeSource::gated(2);
        let (service, cache) = service(Arc::clone(&source));

        let (a, b) = tokio::join!(service.resolve(ID, ""), service.resolve(ID, ""));

        assert_eq!(a.unwrap().bytes(), b.unwrap().bytes());
        assert_eq!(source.calls(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_response_metadata() {
        let (service, _) = service(FakeSource::ok());

        let avatar = service.resolve(&ID.to_uppercase(), "s=80").await.unwrap();

        assert_eq!(avatar.content_type(), "image/jpeg");
        assert_eq!(
            avatar.content_disposition(),
            format!("inline; filename=\"{ID}.jpg\"")
        );
        assert_eq!(
            avatar.canonical_link(),
            format!("<{BASE}{ID}?s=80>; rel=\"canonical\"")
        );
    }

    #[test]
    fn test_upstream_gets_trailing_slash() {
        let cache = Arc::new(AvatarCache::new(1, Duration::from_secs(1)).unwrap());
        let service = AvatarService::new(
            "https://home.test/",
            "https://avatars.test/avatar",
            FakeSource::ok(),
            cache,
        );

        assert_eq!(service.upstream(), "https://avatars.test/avatar/");
    }

    #[tokio::test]
    async fn test_end_to_end_with_fetch_client() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/avatar/{ID}")))
            .and(query_param("s", "80"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tiny_png()))
            .expect(1)
            .mount(&server)
            .await;

        let client = FetchClient::with_config(FetchConfig {
            requests_per_second: 100.0,
            burst: 5,
            ..FetchConfig::new("TestService", "test@example.com")
        })
        .unwrap();
        let cache = Arc::new(AvatarCache::new(8, Duration::from_secs(60)).unwrap());
        let service = AvatarService::new(
            "https://home.test/",
            format!("{}/avatar/", server.uri()),
            Arc::new(client),
            Arc::clone(&cache),
        );

        let first = service.resolve(ID, "s=80").await.unwrap();
        let second = service.resolve(ID, "s=80").await.unwrap();

        assert_eq!(first.bytes().as_ref(), tiny_png().as_slice());
        assert_eq!(first.bytes(), second.bytes());
        assert_eq!(cache.len(), 1);
    }
}
