//! Prometheus metrics endpoint handler.
//!
//! This endpoint is unauthenticated to allow Prometheus to scrape metrics.
//! Labels are bounded and never carry subjects or session ids.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
#[tracing::instrument(skip_all, name = "bridge.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
