//! Integration tests for liveness and readiness probes
//!
//! Readiness tracks whether the bridge can resolve signing keys.

use crate::harness::TestBridgeServer;
use auth_test_utils::TestKeypair;
use reqwest::StatusCode;

#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestBridgeServer::spawn().await?;

    // Act
    let response = reqwest::get(format!("{}/health", server.url())).await?;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "OK");

    Ok(())
}

#[tokio::test]
async fn test_ready_returns_503_when_idp_unreachable() -> Result<(), anyhow::Error> {
    // Arrange: nothing mounted, every JWKS request gets 404
    let server = TestBridgeServer::spawn().await?;

    // Act
    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    // Assert
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert!(
        body.get("signing_keys").is_none(),
        "Not-ready body should not report a key count"
    );

    Ok(())
}

#[tokio::test]
async fn test_ready_recovers_once_keys_are_served() -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestBridgeServer::spawn().await?;
    let key = TestKeypair::new(1, "key-1");
    let ready_url = format!("{}/ready", server.url());

    assert_eq!(
        reqwest::get(&ready_url).await?.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );

    // Act
    server.idp().serve_keys(&[&key]).await;
    let response = reqwest::get(&ready_url).await?;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["signing_keys"], 1);

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<(), anyhow::Error> {
    let server = TestBridgeServer::spawn().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}
