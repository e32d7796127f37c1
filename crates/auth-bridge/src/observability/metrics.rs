//! Metrics definitions for the auth bridge.
//!
//! All metrics follow Prometheus naming conventions:
//! - `bridge_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: success, error
//! - `outcome`: success or an `AuthError::kind()` label
//! - `path`: bearer, session, none
//! - `endpoint`: the fixed route table, everything else is `/other`
//!
//! Subjects, session ids and group names never appear in labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("bridge_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // JWKS fetches are bounded by the fetch timeout (5s by default)
        .set_buckets_for_metric(
            Matcher::Prefix("bridge_jwks_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `bridge_http_requests_total`, `bridge_http_request_duration_seconds`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);

    histogram!("bridge_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint
    )
    .record(duration.as_secs_f64());

    counter!("bridge_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Normalize endpoint path to prevent label cardinality explosion
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/v1/session" => "/api/v1/session",
        "/api/v1/me" => "/api/v1/me",
        p if p.starts_with("/api/v1/authorize/") => "/api/v1/authorize/{permission}",
        _ => "/other",
    }
}

// ============================================================================
// Key Resolution Metrics
// ============================================================================

/// Record a JWKS fetch attempt
///
/// Metric: `bridge_jwks_refresh_total`, `bridge_jwks_refresh_duration_seconds`
/// Labels: `status` (success, error)
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("bridge_jwks_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("bridge_jwks_refresh_total", "status" => status).increment(1);
}

/// Record that a stale key set was served after a failed refresh
///
/// Metric: `bridge_jwks_stale_served_total`
pub fn record_jwks_stale_served() {
    counter!("bridge_jwks_stale_served_total").increment(1);
}

// ============================================================================
// Token and Gate Metrics
// ============================================================================

/// Record a token validation outcome
///
/// Metric: `bridge_token_validations_total`
/// Labels: `outcome`
pub fn record_token_validation(outcome: &'static str) {
    counter!("bridge_token_validations_total", "outcome" => outcome).increment(1);
}

/// Record a gate decision
///
/// Metric: `bridge_gate_decisions_total`
/// Labels: `outcome` (allowed or an error kind), `path` (bearer, session, none)
pub fn record_gate_decision(outcome: &'static str, path: &'static str) {
    counter!("bridge_gate_decisions_total", "outcome" => outcome, "path" => path).increment(1);
}

/// Record a mapping policy violation
///
/// Metric: `bridge_mapping_policy_violations_total`
pub fn record_mapping_policy_violation() {
    counter!("bridge_mapping_policy_violations_total").increment(1);
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Set the number of live sessions
///
/// Metric: `bridge_sessions_active`
#[allow(clippy::cast_precision_loss)]
pub fn set_sessions_active(count: usize) {
    gauge!("bridge_sessions_active").set(count as f64);
}

/// Record sessions removed by the expiry sweeper
///
/// Metric: `bridge_sessions_purged_total`
pub fn record_sessions_purged(count: usize) {
    counter!("bridge_sessions_purged_total").increment(count as u64);
}
