//! Liveness and readiness probes.

use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Readiness probe body.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_keys: Option<usize>,
}

/// Liveness probe. Always `OK` while the process serves requests.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe.
///
/// Ready when a usable signing key set is loaded (fresh, or stale within its
/// grace window). Returns 503 otherwise so the load balancer stops routing
/// logins to an instance that cannot validate tokens.
#[instrument(skip_all, name = "bridge.health.ready")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> Response {
    match state.resolver.ensure_loaded().await {
        Ok(count) => Json(ReadinessResponse {
            status: "ready",
            signing_keys: Some(count),
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(target: "bridge.health", error = %e, "Readiness check failed: signing keys unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    signing_keys: None,
                }),
            )
                .into_response()
        }
    }
}
