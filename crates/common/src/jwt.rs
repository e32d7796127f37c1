//! JWT utilities shared by the auth bridge and its test tooling.
//!
//! This module provides the provider-independent parts of token validation:
//! - Size limits for DoS prevention
//! - Clock skew constants
//! - Header parsing (`kid` and `alg`) without signature verification
//! - Time-window checks for `iat`, `nbf` and `exp`
//! - Decoding of JWK key material
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Header values are only used to select a key from a trusted JWKS; the
//!   token MUST still be verified against that key
//! - Error messages are intentionally generic to prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{parse_header, check_time_window_at, DEFAULT_CLOCK_SKEW};
//!
//! let header = parse_header(token)?;
//! let key = resolver.get_key(&header.kid).await?;
//! // ... verify signature with `key` ...
//! check_time_window_at(claims.iat, claims.exp, claims.nbf, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Cognito ID tokens with a handful of groups are 1-2KB. Anything larger than
/// this limit is rejected before base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (60 seconds).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Configuration above this value is refused at startup.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a token before verification.
///
/// Every variant renders the same client-facing message. The variant itself is
/// only used for server-side logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token header is missing a usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token header is missing the `alg` field.
    #[error("The access token is invalid or expired")]
    MissingAlg,
}

/// Which end of the validity window a token fell outside of.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindowViolation {
    /// `exp` is in the past.
    #[error("token expired")]
    Expired,

    /// `iat` or `nbf` (minus skew) is in the future.
    #[error("token not yet valid")]
    NotYetValid,
}

// =============================================================================
// Header
// =============================================================================

/// The fields of a JWT header needed to select a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Key ID used to look the signing key up in the JWKS.
    pub kid: String,

    /// Algorithm name as written in the header (e.g. `RS256`, `EdDSA`).
    pub alg: String,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    kid: Option<serde_json::Value>,
    #[serde(default)]
    alg: Option<String>,
}

/// Parse the header of a JWT without verifying the signature.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong segment count, bad base64, or invalid JSON
/// - `MissingKid` - `kid` absent, empty, or not a string
/// - `MissingAlg` - `alg` absent or empty
pub fn parse_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    if header_part.is_empty() || payload.is_empty() || signature.is_empty() {
        tracing::debug!(target: "common.jwt", "Token rejected: empty JWT segment");
        return Err(JwtValidationError::MalformedToken);
    }

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let kid = header
        .kid
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    let alg = header
        .alg
        .filter(|s| !s.is_empty())
        .ok_or(JwtValidationError::MissingAlg)?;

    Ok(TokenHeader { kid, alg })
}

// =============================================================================
// Time window
// =============================================================================

/// Check `iat`, optional `nbf` and `exp` against `now`.
///
/// A token is valid when `iat - skew <= now`, `nbf - skew <= now` (if `nbf`
/// is present) and `now <= exp`. The skew allowance only widens the start
/// of the window; an expired token is expired on every clock.
///
/// # Errors
///
/// - `Expired` if `now` is past `exp`
/// - `NotYetValid` if `iat` or `nbf` is more than `skew` in the future
pub fn check_time_window_at(
    iat: i64,
    exp: i64,
    nbf: Option<i64>,
    clock_skew: Duration,
    now: i64,
) -> Result<(), TimeWindowViolation> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let skew = clock_skew.as_secs() as i64;

    if now > exp {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(TimeWindowViolation::Expired);
    }

    let not_before = nbf.map_or(iat, |nbf| nbf.max(iat));
    if not_before.saturating_sub(skew) > now {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            nbf = ?nbf,
            now = now,
            clock_skew_secs = skew,
            "Token rejected: issued in the future"
        );
        return Err(TimeWindowViolation::NotYetValid);
    }

    Ok(())
}

// =============================================================================
// Key material
// =============================================================================

/// Decode an Ed25519 public key from a JWK `x` field (base64url, no padding).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the content cannot be decoded.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================
