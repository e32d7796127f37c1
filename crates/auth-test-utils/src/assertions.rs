//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for rejection bodies and signed tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Assertions on a `{error_kind, message}` rejection body.
///
/// # Example
/// ```rust,ignore
/// body.assert_error_kind("unauthenticated")
///     .assert_does_not_mention("audience");
/// ```
pub trait RejectionAssertions {
    /// Assert the `error_kind` field
    fn assert_error_kind(&self, kind: &str) -> &Self;

    /// Assert the `message` field
    fn assert_message(&self, message: &str) -> &Self;

    /// Assert that nothing in the body mentions `needle`
    fn assert_does_not_mention(&self, needle: &str) -> &Self;
}

impl RejectionAssertions for serde_json::Value {
    fn assert_error_kind(&self, kind: &str) -> &Self {
        assert_eq!(
            self["error_kind"], kind,
            "Expected error_kind '{}', body was {}",
            kind, self
        );
        self
    }

    fn assert_message(&self, message: &str) -> &Self {
        assert_eq!(
            self["message"], message,
            "Expected message '{}', body was {}",
            message, self
        );
        self
    }

    fn assert_does_not_mention(&self, needle: &str) -> &Self {
        let rendered = self.to_string();
        assert!(
            !rendered.contains(needle),
            "Body must not mention '{}', was {}",
            needle,
            rendered
        );
        self
    }
}

/// Assertions on a compact-serialized JWT.
pub trait TokenAssertions {
    /// Assert that the token has three non-empty segments
    fn assert_valid_jwt(&self) -> &Self;

    /// Assert that the header names the given key id
    fn assert_signed_by(&self, key_id: &str) -> &Self;
}

impl TokenAssertions for String {
    fn assert_valid_jwt(&self) -> &Self {
        let parts: Vec<_> = self.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "JWT must have 3 parts (header.payload.signature), got {}",
            parts.len()
        );
        assert!(parts.iter().all(|p| !p.is_empty()), "JWT segments must be non-empty");
        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        let header_b64 = self.split('.').next().expect("JWT has no header");
        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .expect("JWT header must be base64url");
        let header: serde_json::Value =
            serde_json::from_slice(&header_bytes).expect("JWT header must be JSON");
        assert_eq!(header["kid"], key_id, "Token signed by unexpected key");
        self
    }
}
