//! Integration tests for the request gate over HTTP
//!
//! Covers bearer-token authentication, permission checks and the rejection
//! contract (status, body and WWW-Authenticate).

use crate::harness::TestBridgeServer;
use auth_bridge::auth::Permission;
use auth_bridge::middleware::{require_permission, PermissionGuard, PrincipalExt};
use auth_test_utils::{tamper_signature, RejectionAssertions, TestKeypair, TestTokenBuilder};
use axum::body::Body;
use axum::extract::Request;
use axum::http::{Request as HttpRequest, StatusCode as AxumStatus};
use axum::routing::get;
use axum::{middleware, Router};
use reqwest::{header, StatusCode};
use tower::ServiceExt;

async fn server_with_key() -> Result<(TestBridgeServer, TestKeypair), anyhow::Error> {
    let server = TestBridgeServer::spawn().await?;
    let key = TestKeypair::new(1, "key-1");
    server.idp().serve_keys(&[&key]).await;
    Ok((server, key))
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_me_returns_principal_for_valid_bearer() -> Result<(), anyhow::Error> {
    // Arrange
    let (server, key) = server_with_key().await?;
    let token = key.sign(
        &TestTokenBuilder::new()
            .for_user("alice")
            .in_groups(&["students"])
            .with_email("alice@example.edu")
            .build(),
    );

    // Act
    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/me", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["principal_id"], "alice");
    assert_eq!(body["email"], "alice@example.edu");
    assert_eq!(body["auth_method"], "bearer");
    let permissions = body["permissions"].as_array().expect("permissions array");
    assert!(permissions.contains(&serde_json::json!("TICKET_VIEW")));
    assert!(!permissions.contains(&serde_json::json!("TRAC_ADMIN")));

    Ok(())
}

#[tokio::test]
async fn test_missing_credentials_returns_401_with_challenge() -> Result<(), anyhow::Error> {
    let (server, _key) = server_with_key().await?;

    let response = reqwest::get(format!("{}/api/v1/me", server.url())).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(
        response.headers().contains_key(header::WWW_AUTHENTICATE),
        "401 should carry WWW-Authenticate"
    );
    let body: serde_json::Value = response.json().await?;
    body.assert_error_kind("unauthenticated");

    Ok(())
}

#[tokio::test]
async fn test_token_expired_ten_seconds_ago_returns_401() -> Result<(), anyhow::Error> {
    // Arrange: a student token that lapsed 10 s ago, inside the clock-skew window
    let (server, key) = server_with_key().await?;
    let token = key.sign(
        &TestTokenBuilder::new()
            .in_groups(&["students"])
            .expires_in(-10)
            .build(),
    );

    // Act
    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/authorize/TICKET_VIEW", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    let body: serde_json::Value = response.json().await?;
    body.assert_error_kind("unauthenticated");
    body.assert_does_not_mention("claim");

    Ok(())
}

#[tokio::test]
async fn test_rejections_do_not_reveal_which_check_failed() -> Result<(), anyhow::Error> {
    let (server, key) = server_with_key().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/me", server.url());

    let tampered = tamper_signature(&key.sign(&TestTokenBuilder::new().build()));
    let wrong_audience = key.sign(&TestTokenBuilder::new().for_audience("other-app").build());
    let wrong_issuer = key.sign(
        &TestTokenBuilder::new()
            .issued_by("https://evil.example.com")
            .build(),
    );

    let mut messages = Vec::new();
    for token in [tampered, wrong_audience, wrong_issuer] {
        let response = client.get(&url).bearer_auth(&token).send().await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = response.json().await?;
        messages.push(body["message"].clone());
    }

    assert!(
        messages.windows(2).all(|pair| pair[0] == pair[1]),
        "All token rejections should share one message: {messages:?}"
    );

    Ok(())
}

#[tokio::test]
async fn test_garbage_authorization_header_returns_401() -> Result<(), anyhow::Error> {
    let (server, _key) = server_with_key().await?;

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/me", server.url()))
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn test_idp_outage_without_cached_keys_returns_401() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn().await?;
    let key = TestKeypair::new(1, "key-1");
    server.idp().fail_with_status(503).await;
    let token = key.sign(&TestTokenBuilder::new().build());

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/me", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // One attempt plus one retry
    assert_eq!(server.idp().request_count().await, 2);

    Ok(())
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_authorize_endpoint_outcomes() -> Result<(), anyhow::Error> {
    let (server, key) = server_with_key().await?;
    let client = reqwest::Client::new();
    let student = key.sign(&TestTokenBuilder::new().in_groups(&["students"]).build());
    let authorize = |name: &str| format!("{}/api/v1/authorize/{}", server.url(), name);

    let held = client
        .get(authorize("TICKET_VIEW"))
        .bearer_auth(&student)
        .send()
        .await?;
    assert_eq!(held.status(), StatusCode::NO_CONTENT);

    let not_held = client
        .get(authorize("TRAC_ADMIN"))
        .bearer_auth(&student)
        .send()
        .await?;
    assert_eq!(not_held.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = not_held.json().await?;
    body.assert_error_kind("forbidden");

    let unknown = client
        .get(authorize("TICKET_TELEPORT"))
        .bearer_auth(&student)
        .send()
        .await?;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_admin_satisfies_every_permission() -> Result<(), anyhow::Error> {
    let (server, key) = server_with_key().await?;
    let admin = key.sign(&TestTokenBuilder::new().in_groups(&["admins"]).build());

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/authorize/WIKI_DELETE", server.url()))
        .bearer_auth(&admin)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn test_unmapped_groups_grant_nothing() -> Result<(), anyhow::Error> {
    let (server, key) = server_with_key().await?;
    let token = key.sign(&TestTokenBuilder::new().in_groups(&["alumni"]).build());

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/authorize/TICKET_VIEW", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn test_permission_overrides_apply() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn_with(&[(
        "PERMISSION_OVERRIDES",
        r#"{"alumni": ["WIKI_VIEW"]}"#,
    )])
    .await?;
    let key = TestKeypair::new(1, "key-1");
    server.idp().serve_keys(&[&key]).await;
    let token = key.sign(&TestTokenBuilder::new().in_groups(&["alumni"]).build());

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/authorize/WIKI_VIEW", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn test_permission_guard_middleware() -> Result<(), anyhow::Error> {
    // Arrange: a host route guarded by TICKET_CREATE
    let (server, key) = server_with_key().await?;
    let guard = PermissionGuard::new(server.state().auth_state(), Permission::TicketCreate);
    let app = Router::new()
        .route(
            "/newticket",
            get(|req: Request| async move {
                req.principal()
                    .map(|p| p.principal_id.clone())
                    .unwrap_or_default()
            }),
        )
        .route_layer(middleware::from_fn_with_state(guard, require_permission));

    let student = key.sign(
        &TestTokenBuilder::new()
            .for_user("alice")
            .in_groups(&["students"])
            .build(),
    );
    let nobody = key.sign(&TestTokenBuilder::new().for_user("bob").build());

    // Act
    let allowed = app
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/newticket")
                .header("authorization", format!("Bearer {student}"))
                .body(Body::empty())?,
        )
        .await?;
    let denied = app
        .oneshot(
            HttpRequest::builder()
                .uri("/newticket")
                .header("authorization", format!("Bearer {nobody}"))
                .body(Body::empty())?,
        )
        .await?;

    // Assert
    assert_eq!(allowed.status(), AxumStatus::OK);
    assert_eq!(denied.status(), AxumStatus::FORBIDDEN);

    Ok(())
}
