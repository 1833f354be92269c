//! Lifecycle service HTTP surface
//!
//! Lets downstream consumers in other processes share one refresh cooldown.
//!
//! Endpoints:
//! - GET  /health:  session summary and snapshot age
//! - GET  /session: current `session.json` artifact
//! - GET  /catalog: `catalog.json` as written by the last discovery run
//! - POST /refresh: `refresh_if_warranted`, mapped onto status codes
//! - GET  /metrics: Prometheus text exposition

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use session_lifecycle::{LifecycleManager, RefreshOutcome};
use tracing::{info, warn};

/// Refreshes launch a browser each; cap how many requests run at once.
const MAX_CONCURRENT_REQUESTS: usize = 64;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ServerState {
    manager: Arc<LifecycleManager>,
    catalog_path: Arc<PathBuf>,
    prometheus: PrometheusHandle,
}

impl ServerState {
    pub fn new(
        manager: Arc<LifecycleManager>,
        catalog_path: PathBuf,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self {
            manager,
            catalog_path: Arc::new(catalog_path),
            prometheus,
        }
    }
}

pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/session", get(session_handler))
        .route("/catalog", get(catalog_handler))
        .route("/refresh", post(refresh_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            MAX_CONCURRENT_REQUESTS,
        ))
        .with_state(state)
}

fn json(status: StatusCode, body: serde_json::Value) -> impl IntoResponse {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// GET /health. Never exposes header values.
async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.manager.snapshot().await;
    let age_secs = snapshot.age_millis(common::now_millis()) / 1000;
    let since_attempt = state.manager.since_last_attempt().await;
    json(
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "instance_url": snapshot.instance_url,
            "strategy": snapshot.strategy.as_str(),
            "verified": snapshot.verified,
            "cookie_count": snapshot.cookie_count,
            "has_csrf_token": snapshot.has_csrf_token,
            "snapshot_age_seconds": age_secs,
            "cooldown_seconds": state.manager.cooldown().as_secs(),
            "seconds_since_refresh_attempt": since_attempt.map(|d| d.as_secs()),
        }),
    )
}

/// GET /session: the artifact downstream callers build requests from.
async fn session_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let artifact = state.manager.snapshot().await.artifact();
    match serde_json::to_value(&artifact) {
        Ok(body) => json(StatusCode::OK, body),
        Err(e) => json(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "serialize_failed", "message": e.to_string() }),
        ),
    }
}

/// GET /catalog, served verbatim from disk.
async fn catalog_handler(State(state): State<ServerState>) -> impl IntoResponse {
    match tokio::fs::read_to_string(state.catalog_path.as_ref()).await {
        Ok(contents) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            contents,
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (
            StatusCode::NOT_FOUND,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "error": "catalog_not_found" }).to_string(),
        ),
        Err(e) => {
            warn!(error = %e, path = %state.catalog_path.display(), "reading catalog failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                serde_json::json!({ "error": "catalog_unreadable" }).to_string(),
            )
        }
    }
}

/// POST /refresh, called by a consumer after a 401/403.
///
/// 200 refreshed, 429 inside the cooldown, 409 when a fresh login produced
/// identical credentials (retrying cannot help), 502 when the login failed.
async fn refresh_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let result = state
        .manager
        .refresh_if_warranted()
        .await
        .and_then(RefreshOutcome::ensure_recoverable);

    let (status, body) = match result {
        Ok(outcome @ RefreshOutcome::Refreshed) => (
            StatusCode::OK,
            serde_json::json!({ "outcome": outcome.as_str() }),
        ),
        Ok(outcome) => (
            StatusCode::TOO_MANY_REQUESTS,
            serde_json::json!({
                "outcome": outcome.as_str(),
                "cooldown_seconds": state.manager.cooldown().as_secs(),
            }),
        ),
        Err(session_lifecycle::Error::ReauthSuppressed) => (
            StatusCode::CONFLICT,
            serde_json::json!({
                "outcome": RefreshOutcome::NoChange.as_str(),
                "error": "reauth_suppressed",
            }),
        ),
        Err(e @ session_lifecycle::Error::Relogin(_)) => (
            StatusCode::BAD_GATEWAY,
            serde_json::json!({ "error": "relogin_failed", "message": e.to_string() }),
        ),
        Err(e @ session_lifecycle::Error::Persist(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "persist_failed", "message": e.to_string() }),
        ),
    };
    crate::metrics::record_refresh_request(status.as_u16());
    info!(status = status.as_u16(), "refresh request handled");
    json(status, body)
}

async fn metrics_handler(State(state): State<ServerState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
