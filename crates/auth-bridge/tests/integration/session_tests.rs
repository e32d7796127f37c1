//! Integration tests for session login, reuse and logout

use crate::harness::{session_id_from_set_cookie, TestBridgeServer};
use auth_bridge::config::DEFAULT_SESSION_COOKIE_NAME;
use auth_test_utils::{TestKeypair, TestTokenBuilder};
use reqwest::{header, Client, StatusCode};

async fn login(
    client: &Client,
    server: &TestBridgeServer,
    token: &str,
) -> Result<(reqwest::Response, String), anyhow::Error> {
    let response = client
        .post(format!("{}/api/v1/session", server.url()))
        .bearer_auth(token)
        .send()
        .await?;
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Ok((response, set_cookie))
}

fn cookie(session_id: &str) -> String {
    format!("{DEFAULT_SESSION_COOKIE_NAME}={session_id}")
}

#[tokio::test]
async fn test_login_session_logout_flow() -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestBridgeServer::spawn().await?;
    let key = TestKeypair::new(1, "key-1");
    server.idp().serve_keys(&[&key]).await;
    let client = Client::new();
    let token = key.sign(
        &TestTokenBuilder::new()
            .for_user("alice")
            .in_groups(&["instructors"])
            .build(),
    );

    // Act: login
    let (response, set_cookie) = login(&client, &server, &token).await?;

    // Assert: cookie and summary
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie.starts_with(DEFAULT_SESSION_COOKIE_NAME));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(!set_cookie.contains("Secure"), "harness disables Secure");
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["principal_id"], "alice");
    assert!(
        body.get("session_id").is_none(),
        "The session id travels only in the cookie"
    );
    let session_id = session_id_from_set_cookie(&set_cookie).unwrap();
    assert_eq!(session_id.len(), 64);

    // Act: use the session without a bearer token
    let me = client
        .get(format!("{}/api/v1/me", server.url()))
        .header(header::COOKIE, cookie(&session_id))
        .send()
        .await?;
    assert_eq!(me.status(), StatusCode::OK);
    let me: serde_json::Value = me.json().await?;
    assert_eq!(me["principal_id"], "alice");
    assert_eq!(me["auth_method"], "session");

    // Act: logout
    let logout = client
        .delete(format!("{}/api/v1/session", server.url()))
        .header(header::COOKIE, cookie(&session_id))
        .send()
        .await?;
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);
    let cleared = logout
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cleared.contains("Max-Age=0"));

    // Assert: the session no longer authenticates
    let after = client
        .get(format!("{}/api/v1/me", server.url()))
        .header(header::COOKIE, cookie(&session_id))
        .send()
        .await?;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn test_second_login_reuses_live_session() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn().await?;
    let key = TestKeypair::new(1, "key-1");
    server.idp().serve_keys(&[&key]).await;
    let client = Client::new();
    let token = key.sign(&TestTokenBuilder::new().for_user("alice").build());

    let (_, first) = login(&client, &server, &token).await?;
    let (_, second) = login(&client, &server, &token).await?;

    assert_eq!(
        session_id_from_set_cookie(&first),
        session_id_from_set_cookie(&second)
    );
    assert_eq!(server.state().sessions.purge_expired().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_login_requires_bearer_token() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn().await?;

    let response = Client::new()
        .post(format!("{}/api/v1/session", server.url()))
        .header(header::COOKIE, cookie("deadbeef"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    Ok(())
}

#[tokio::test]
async fn test_login_with_invalid_token_creates_no_session() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn().await?;
    let key = TestKeypair::new(1, "key-1");
    let stranger = TestKeypair::new(2, "key-2");
    server.idp().serve_keys(&[&key]).await;

    let (response, set_cookie) = login(
        &Client::new(),
        &server,
        &stranger.sign(&TestTokenBuilder::new().build()),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unknown_session_cookie_returns_401() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn().await?;

    let response = Client::new()
        .get(format!("{}/api/v1/me", server.url()))
        .header(header::COOKIE, cookie(&"ab".repeat(32)))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}
