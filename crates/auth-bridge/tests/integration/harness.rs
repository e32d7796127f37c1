//! Test server harness
//!
//! Spawns a real bridge instance on a random port, wired to a mock identity
//! provider JWKS endpoint.

use auth_bridge::config::Config;
use auth_bridge::auth::HttpJwksFetcher;
use auth_bridge::routes::{self, AppState};
use auth_bridge::session::InMemorySessionStore;
use auth_test_utils::{MockJwksServer, TEST_AUDIENCE, TEST_ISSUER};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct TestBridgeServer {
    addr: SocketAddr,
    idp: MockJwksServer,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestBridgeServer {
    /// Spawn with default settings. Unknown kids are always refetched.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(&[]).await
    }

    /// Spawn with extra configuration variables layered over the defaults.
    pub async fn spawn_with(overrides: &[(&str, &str)]) -> Result<Self, anyhow::Error> {
        let idp = MockJwksServer::start().await;

        let mut vars: HashMap<String, String> = HashMap::from([
            ("AUTH_ISSUER".to_string(), TEST_ISSUER.to_string()),
            ("AUTH_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("AUTH_JWKS_URI".to_string(), idp.jwks_uri()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("SESSION_COOKIE_SECURE".to_string(), "false".to_string()),
            (
                "JWKS_MIN_REFRESH_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }
        let config = Config::from_vars(&vars)?;

        let fetcher = Arc::new(HttpJwksFetcher::new(config.jwks_uri.clone()));
        let store = Arc::new(InMemorySessionStore::new());
        let state = Arc::new(AppState::new(config, fetcher, store));

        // Local handle; the global recorder is not installed in tests
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {e}");
            }
        });

        Ok(Self {
            addr,
            idp,
            state,
            _handle: handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn idp(&self) -> &MockJwksServer {
        &self.idp
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

/// Extract the session id from a `Set-Cookie` header value.
pub fn session_id_from_set_cookie(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?;
    let (_, value) = pair.split_once('=')?;
    Some(value.trim().to_string())
}
