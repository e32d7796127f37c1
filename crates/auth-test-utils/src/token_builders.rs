//! Builder patterns for test data construction
//!
//! Provides a fluent API for Cognito-shaped token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer used by default in test tokens.
pub const TEST_ISSUER: &str = "https://cognito-idp.us-east-2.amazonaws.com/us-east-2_TestPool";

/// App client id used by default in test tokens.
pub const TEST_AUDIENCE: &str = "learntrac-test-client";

/// Builder for creating test JWT claims
///
/// Defaults to an ID token for `test-subject`, issued now by [`TEST_ISSUER`]
/// for [`TEST_AUDIENCE`], valid for an hour, with no groups.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("alice")
///     .in_groups(&["students"])
///     .expires_in(600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".into(), json!("test-subject"));
        claims.insert("iss".into(), json!(TEST_ISSUER));
        claims.insert("aud".into(), json!(TEST_AUDIENCE));
        claims.insert("token_use".into(), json!("id"));
        claims.insert("exp".into(), json!((now + Duration::seconds(3600)).timestamp()));
        claims.insert("iat".into(), json!(now.timestamp()));
        Self { claims }
    }

    /// Set the subject
    pub fn for_user(self, subject: &str) -> Self {
        self.with_claim("sub", json!(subject))
    }

    /// Set the issuer
    pub fn issued_by(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    /// Set the audience
    pub fn for_audience(self, audience: &str) -> Self {
        self.with_claim("aud", json!(audience))
    }

    /// Shape the claims like a Cognito access token: no `aud`, the app client
    /// in `client_id`.
    pub fn as_access_token(mut self, client_id: &str) -> Self {
        self.claims.remove("aud");
        self.with_claim("client_id", json!(client_id))
            .with_claim("token_use", json!("access"))
    }

    /// Set `cognito:groups`
    pub fn in_groups(self, groups: &[&str]) -> Self {
        self.with_claim("cognito:groups", json!(groups))
    }

    pub fn with_email(self, email: &str) -> Self {
        self.with_claim("email", json!(email))
    }

    pub fn with_username(self, username: &str) -> Self {
        self.with_claim("cognito:username", json!(username))
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("exp", json!(exp))
    }

    /// Set expiration timestamp
    pub fn expires_at(self, timestamp: i64) -> Self {
        self.with_claim("exp", json!(timestamp))
    }

    /// Set issued-at timestamp
    pub fn issued_at(self, timestamp: i64) -> Self {
        self.with_claim("iat", json!(timestamp))
    }

    /// Set not-before timestamp
    pub fn not_before(self, timestamp: i64) -> Self {
        self.with_claim("nbf", json!(timestamp))
    }

    /// Set an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let claims = TestTokenBuilder::new().build();

        assert_eq!(claims["sub"], "test-subject");
        assert_eq!(claims["iss"], TEST_ISSUER);
        assert_eq!(claims["aud"], TEST_AUDIENCE);
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
        assert!(claims.get("cognito:groups").is_none());
    }

    #[test]
    fn test_access_token_shape() {
        let claims = TestTokenBuilder::new().as_access_token("client-1").build();

        assert!(claims.get("aud").is_none());
        assert_eq!(claims["client_id"], "client-1");
        assert_eq!(claims["token_use"], "access");
    }

    #[test]
    fn test_groups_and_removal() {
        let claims = TestTokenBuilder::new()
            .in_groups(&["students", "admins"])
            .without_claim("iat")
            .build();

        assert_eq!(claims["cognito:groups"], json!(["students", "admins"]));
        assert!(claims.get("iat").is_none());
    }
}
