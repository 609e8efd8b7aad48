//! Request middleware for the avatar routes

use std::any::Any;

use axum::extract::Request;
use axum::http::header::{
    HeaderName, HeaderValue, InvalidHeaderValue, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, USER_AGENT,
};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{error, Level};

use crate::error::ErrorResponse;

const PRIVACY_POLICY: HeaderName = HeaderName::from_static("privacy-policy");
const TERMS_OF_SERVICE: HeaderName = HeaderName::from_static("terms-of-service");

const ALLOW_ORIGIN: HeaderValue = HeaderValue::from_static("*");
const ALLOW_METHODS: HeaderValue = HeaderValue::from_static("GET, HEAD, OPTIONS");
const ALLOW_HEADERS: HeaderValue =
    HeaderValue::from_static("Accept, Content-Type, Content-Length, Accept-Encoding");

/// Policy links attached to every response
#[derive(Debug, Clone)]
pub struct Policy {
    privacy_policy: HeaderValue,
    terms_of_service: HeaderValue,
}

impl Policy {
    pub fn new(privacy_policy: &str, terms_of_service: &str) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            privacy_policy: HeaderValue::from_str(privacy_policy)?,
            terms_of_service: HeaderValue::from_str(terms_of_service)?,
        })
    }
}

/// Wrap `router` in the middleware chain.
///
/// Layers are listed innermost first: panic recovery sits right around the
/// handlers and the optional access log is outermost, so CORS answers
/// `OPTIONS` before the user-agent and method checks run.
pub fn apply<S>(router: Router<S>, policy: &Policy, log_requests: bool) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let router = router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(require_user_agent))
        .layer(middleware::from_fn(accept_requests))
        .layer(SetResponseHeaderLayer::overriding(
            PRIVACY_POLICY,
            policy.privacy_policy.clone(),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            TERMS_OF_SERVICE,
            policy.terms_of_service.clone(),
        ))
        .layer(middleware::from_fn(cors));

    if log_requests {
        router.layer(
            TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
    } else {
        router
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic payload"
    };
    error!(panic = detail, "panic recovered");

    ErrorResponse::internal().into_response()
}

async fn require_user_agent(req: Request, next: Next) -> Response {
    let present = req
        .headers()
        .get(USER_AGENT)
        .is_some_and(|ua| !ua.as_bytes().is_empty());

    if !present {
        return ErrorResponse::new(
            StatusCode::BAD_REQUEST,
            "User agent is missing. Please provide a valid user agent.",
        )
        .into_response();
    }

    next.run(req).await
}

async fn accept_requests(req: Request, next: Next) -> Response {
    let method = req.method();
    if method != Method::GET && method != Method::HEAD && method != Method::OPTIONS {
        return ErrorResponse::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {method} not allowed. Must be GET, HEAD, or OPTIONS."),
        )
        .into_response();
    }

    next.run(req).await
}

async fn cors(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN);
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS);
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::CONTENT_TYPE;
    use axum::routing::get;
    use tower::ServiceExt;

    async fn boom() -> &'static str {
        panic!("boom")
    }

    fn app() -> Router {
        let router = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/boom", get(boom));
        let policy = Policy::new("https://example.com/privacy", "https://example.com/terms").unwrap();
        apply(router, &policy, false)
    }

    fn request(method: Method, uri: &str, user_agent: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(ua) = user_agent {
            builder = builder.header(USER_AGENT, ua);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_passes_and_sets_headers() {
        let response = app()
            .oneshot(request(Method::GET, "/ok", Some("test/1.0")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["privacy-policy"], "https://example.com/privacy");
        assert_eq!(headers["terms-of-service"], "https://example.com/terms");
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET, HEAD, OPTIONS");
    }

    #[tokio::test]
    async fn test_missing_user_agent() {
        let response = app()
            .oneshot(request(Method::GET, "/ok", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()["privacy-policy"], "https://example.com/privacy");

        let body = json_body(response).await;
        assert_eq!(body["code"], 400);
        assert_eq!(
            body["message"],
            "User agent is missing. Please provide a valid user agent."
        );
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let response = app()
            .oneshot(request(Method::POST, "/ok", Some("test/1.0")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = json_body(response).await;
        assert_eq!(
            body["message"],
            "Method POST not allowed. Must be GET, HEAD, or OPTIONS."
        );
    }

    #[tokio::test]
    async fn test_options_short_circuits() {
        let response = app()
            .oneshot(request(Method::OPTIONS, "/ok", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_panic_is_recovered() {
        let response = app()
            .oneshot(request(Method::GET, "/boom", Some("test/1.0")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["code"], 500);
    }

    #[test]
    fn test_policy_rejects_control_chars() {
        assert!(Policy::new("https://example.com/\n", "https://example.com/terms").is_err());
    }
}
