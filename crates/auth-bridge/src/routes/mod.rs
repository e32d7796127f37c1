//! HTTP routes for the auth bridge.
//!
//! Defines the Axum router and application state.

use crate::auth::jwks::{JwksFetcher, KeyResolver};
use crate::auth::jwt::TokenValidator;
use crate::auth::mapping::ClaimMapper;
use crate::config::Config;
use crate::gate::RequestGate;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_authenticated, AuthState};
use crate::session::store::SessionStore;
use crate::session::SessionBridge;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Signing key cache, also probed by `/ready`.
    pub resolver: Arc<KeyResolver>,

    pub sessions: Arc<SessionBridge>,

    pub gate: Arc<RequestGate>,
}

impl AppState {
    /// Wire the bridge components from configuration.
    ///
    /// The key source and session store are injected so tests and alternate
    /// deployments can swap them.
    pub fn new(
        config: Config,
        fetcher: Arc<dyn JwksFetcher>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let resolver = Arc::new(KeyResolver::new(fetcher, config.key_resolver_config()));
        let validator = Arc::new(TokenValidator::new(
            Arc::clone(&resolver),
            config.clock_skew(),
        ));
        let mapper = Arc::new(ClaimMapper::new(&config.permission_overrides));
        let sessions = Arc::new(SessionBridge::new(
            store,
            Arc::clone(&mapper),
            Duration::from_secs(config.session_max_lifetime_seconds),
            Duration::from_secs(config.session_store_timeout_seconds),
        ));
        let gate = Arc::new(RequestGate::new(
            validator,
            Arc::clone(&sessions),
            mapper,
            config.issuer.clone(),
            config.audience.clone(),
        ));

        Self {
            config,
            resolver,
            sessions,
            gate,
        }
    }

    /// Middleware state for gated routes.
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            gate: Arc::clone(&self.gate),
            cookie_name: Arc::from(self.config.session_cookie_name.as_str()),
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe - public
/// - `/ready` - Readiness probe (signing keys resolvable) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `POST /api/v1/session` - Exchange a bearer token for a session cookie
/// - `DELETE /api/v1/session` - Log out (gated)
/// - `/api/v1/me` - Current principal (gated)
/// - `/api/v1/authorize/:permission` - Forward-auth permission check (gated)
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = state.auth_state();

    // Public routes (no gate). Login validates its bearer token itself.
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/v1/session", post(handlers::create_session))
        .with_state(state.clone());

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Gated routes (bearer token or session cookie)
    let protected_routes = Router::new()
        .route("/api/v1/session", delete(handlers::delete_session))
        .route("/api/v1/me", get(handlers::get_me))
        .route(
            "/api/v1/authorize/:permission",
            get(handlers::check_permission),
        )
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            require_authenticated,
        ))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
