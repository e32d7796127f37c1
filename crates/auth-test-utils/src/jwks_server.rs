//! Mock identity provider JWKS endpoint
//!
//! Wraps a wiremock server that serves `/.well-known/jwks.json`, with helpers
//! for key rotation and outages.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the identity provider publishes its key set at.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A mock identity provider serving a JWKS document.
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a server with nothing mounted (every request gets 404).
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full URL of the JWKS endpoint.
    pub fn jwks_uri(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Serve `keys`, replacing anything served before.
    pub async fn serve_keys(&self, keys: &[&TestKeypair]) {
        self.server.reset().await;
        self.mount(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .await;
    }

    /// Respond with `status`, replacing anything served before.
    pub async fn fail_with_status(&self, status: u16) {
        self.server.reset().await;
        self.mount(ResponseTemplate::new(status)).await;
    }

    /// Respond 200 with a raw body, replacing anything served before.
    pub async fn serve_raw(&self, body: &str) {
        self.server.reset().await;
        self.mount(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string(body),
        )
        .await;
    }

    /// Number of JWKS requests received since the last reset.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    async fn mount(&self, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }
}
