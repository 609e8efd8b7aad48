//! HTTP routes

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use privytar::{Avatar, AvatarService};
use serde::Serialize;
use tracing::{debug, error};

use crate::error::ErrorResponse;
use crate::middleware::{self, Policy};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub avatars: Arc<AvatarService>,
}

/// Build the router.
///
/// `/` and the 404 fallback stay outside the middleware chain; the avatar
/// and stats routes go through it.
pub fn router(state: AppState, policy: &Policy, log_requests: bool) -> Router {
    let avatar_routes = Router::new()
        .route("/avatar/", get(redirect_home))
        .route("/avatar/{hash}", get(get_avatar))
        .route("/stats", get(get_stats));

    Router::new()
        .route("/", get(redirect_home))
        .merge(middleware::apply(avatar_routes, policy, log_requests))
        .fallback(not_found)
        .with_state(state)
}

async fn redirect_home(State(state): State<AppState>) -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, state.avatars.homepage().to_string())],
    )
        .into_response()
}

async fn get_avatar(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let query = query.unwrap_or_default();

    match state.avatars.resolve(&hash, &query).await {
        Ok(avatar) => avatar_response(avatar),
        Err(e) => {
            debug!(hash = %hash, error = %e, "avatar request failed");
            ErrorResponse::from(&e).into_response()
        }
    }
}

fn avatar_response(avatar: Avatar) -> Response {
    let built = axum::http::Response::builder()
        .header(header::CONTENT_TYPE, avatar.content_type())
        .header(header::CONTENT_DISPOSITION, avatar.content_disposition())
        .header(header::LINK, avatar.canonical_link())
        .body(Body::from(avatar.into_bytes()));

    match built {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "failed to build avatar response");
            ErrorResponse::internal().into_response()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    size: usize,
    capacity: usize,
    ttl_seconds: u64,
    hits: u64,
    misses: u64,
    expirations: u64,
    evictions: u64,
    inserts: u64,
    hit_ratio: f64,
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.avatars.cache();
    let stats = cache.stats().snapshot();

    Json(StatsResponse {
        size: cache.len(),
        capacity: cache.capacity(),
        ttl_seconds: cache.ttl().as_secs(),
        hits: stats.hits,
        misses: stats.misses,
        expirations: stats.expirations,
        evictions: stats.evictions,
        inserts: stats.inserts,
        hit_ratio: stats.hit_ratio(),
    })
}

async fn not_found() -> ErrorResponse {
    ErrorResponse::not_found()
}
