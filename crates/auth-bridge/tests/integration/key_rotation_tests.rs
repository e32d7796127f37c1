//! Integration tests for signing key rotation and identity-provider outages

use crate::harness::TestBridgeServer;
use auth_test_utils::{TestKeypair, TestTokenBuilder};
use reqwest::{Client, StatusCode};
use std::time::Duration;

async fn get_me(server: &TestBridgeServer, token: &str) -> Result<StatusCode, anyhow::Error> {
    Ok(Client::new()
        .get(format!("{}/api/v1/me", server.url()))
        .bearer_auth(token)
        .send()
        .await?
        .status())
}

#[tokio::test]
async fn test_cached_keys_are_not_refetched() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn().await?;
    let key = TestKeypair::new(1, "key-1");
    server.idp().serve_keys(&[&key]).await;
    let token = key.sign(&TestTokenBuilder::new().build());

    for _ in 0..3 {
        assert_eq!(get_me(&server, &token).await?, StatusCode::OK);
    }

    assert_eq!(server.idp().request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_rotated_key_is_picked_up_on_unknown_kid() -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestBridgeServer::spawn().await?;
    let old_key = TestKeypair::new(1, "key-old");
    let new_key = TestKeypair::new(2, "key-new");
    server.idp().serve_keys(&[&old_key]).await;

    let old_token = old_key.sign(&TestTokenBuilder::new().build());
    assert_eq!(get_me(&server, &old_token).await?, StatusCode::OK);

    // Act: the provider rotates to a new key and retires the old one
    server.idp().serve_keys(&[&new_key]).await;
    let new_token = new_key.sign(&TestTokenBuilder::new().build());

    // Assert
    assert_eq!(get_me(&server, &new_token).await?, StatusCode::OK);
    assert_eq!(get_me(&server, &old_token).await?, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn test_overlapping_keys_both_validate() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn().await?;
    let old_key = TestKeypair::new(1, "key-old");
    let new_key = TestKeypair::new(2, "key-new");
    server.idp().serve_keys(&[&old_key, &new_key]).await;

    let old_token = old_key.sign(&TestTokenBuilder::new().build());
    let new_token = new_key.sign(&TestTokenBuilder::new().build());

    assert_eq!(get_me(&server, &old_token).await?, StatusCode::OK);
    assert_eq!(get_me(&server, &new_token).await?, StatusCode::OK);
    assert_eq!(server.idp().request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_stale_keys_served_during_outage() -> Result<(), anyhow::Error> {
    // Arrange: one-second cache so the outage hits a refresh
    let server = TestBridgeServer::spawn_with(&[("JWKS_CACHE_TTL_SECONDS", "1")]).await?;
    let key = TestKeypair::new(1, "key-1");
    server.idp().serve_keys(&[&key]).await;
    let token = key.sign(&TestTokenBuilder::new().build());
    assert_eq!(get_me(&server, &token).await?, StatusCode::OK);

    // Act
    server.idp().fail_with_status(500).await;
    tokio::time::sleep(Duration::from_millis(1200)).await;

    // Assert: the last-known-good set is still within its grace window
    assert_eq!(get_me(&server, &token).await?, StatusCode::OK);
    assert!(server.idp().request_count().await >= 1);

    Ok(())
}

#[tokio::test]
async fn test_outage_past_grace_rejects() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn_with(&[
        ("JWKS_CACHE_TTL_SECONDS", "1"),
        ("JWKS_STALE_GRACE_SECONDS", "0"),
    ])
    .await?;
    let key = TestKeypair::new(1, "key-1");
    server.idp().serve_keys(&[&key]).await;
    let token = key.sign(&TestTokenBuilder::new().build());
    assert_eq!(get_me(&server, &token).await?, StatusCode::OK);

    server.idp().fail_with_status(500).await;
    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert_eq!(get_me(&server, &token).await?, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn test_sessions_survive_idp_outage() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn().await?;
    let key = TestKeypair::new(1, "key-1");
    server.idp().serve_keys(&[&key]).await;
    let client = Client::new();

    let login = client
        .post(format!("{}/api/v1/session", server.url()))
        .bearer_auth(key.sign(&TestTokenBuilder::new().build()))
        .send()
        .await?;
    assert_eq!(login.status(), StatusCode::OK);
    let set_cookie = login
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let session_id = crate::harness::session_id_from_set_cookie(&set_cookie).unwrap();

    server.idp().fail_with_status(503).await;

    let me = client
        .get(format!("{}/api/v1/me", server.url()))
        .header(
            reqwest::header::COOKIE,
            format!("{}={}", auth_bridge::config::DEFAULT_SESSION_COOKIE_NAME, session_id),
        )
        .send()
        .await?;
    assert_eq!(me.status(), StatusCode::OK);
    assert_eq!(server.idp().request_count().await, 0);

    Ok(())
}
