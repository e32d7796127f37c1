//! Validated token claims.
//!
//! Built once per successful validation from the verified payload. The
//! `subject` and `raw_claims` fields are redacted in Debug output to prevent
//! exposure in logs.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// The specific claim check a token failed.
///
/// Logged server-side only. Clients always see the generic invalid-token
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimCheck {
    /// A required claim (`sub`, `iss`, `exp`, `iat`) is absent or mistyped.
    MissingClaim(&'static str),
    /// `iss` differs from the configured issuer.
    Issuer,
    /// Neither `aud` nor `client_id` contains the configured audience.
    Audience,
    /// `exp` is in the past.
    Expired,
    /// `iat` or `nbf` is in the future beyond the clock-skew allowance.
    NotYetValid,
}

impl fmt::Display for ClaimCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimCheck::MissingClaim(name) => write!(f, "missing_claim({name})"),
            ClaimCheck::Issuer => f.write_str("issuer"),
            ClaimCheck::Audience => f.write_str("audience"),
            ClaimCheck::Expired => f.write_str("expired"),
            ClaimCheck::NotYetValid => f.write_str("not_yet_valid"),
        }
    }
}

/// Claims of a token whose signature, issuer, audience and validity window
/// have all been checked.
#[derive(Clone, Serialize)]
pub struct ValidatedClaims {
    /// Subject (Cognito user pool `sub`) - redacted in Debug output.
    pub subject: String,

    pub issuer: String,

    /// Every audience the token was issued for (`aud`, or `client_id` for
    /// Cognito access tokens).
    pub audience: Vec<String>,

    /// Expiration timestamp (Unix epoch seconds).
    pub expires_at: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub issued_at: i64,

    /// Identity-provider groups (`cognito:groups` and `groups`).
    pub groups: BTreeSet<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// `name`, else `cognito:username`, else `preferred_username`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// The full verified payload - redacted in Debug output.
    #[serde(skip)]
    pub raw_claims: Map<String, Value>,
}

impl fmt::Debug for ValidatedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedClaims")
            .field("subject", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expires_at", &self.expires_at)
            .field("issued_at", &self.issued_at)
            .field("groups", &self.groups)
            .field("raw_claims", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// The registered claims read out of a verified payload before the issuer,
/// audience and time checks run.
#[derive(Debug)]
pub(crate) struct RegisteredClaims {
    pub sub: String,
    pub iss: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    pub nbf: Option<i64>,
}

impl RegisteredClaims {
    /// Read the registered claims out of `payload`.
    ///
    /// # Errors
    ///
    /// Returns `ClaimCheck::MissingClaim` naming the first absent or mistyped
    /// claim.
    pub(crate) fn from_payload(payload: &Map<String, Value>) -> Result<Self, ClaimCheck> {
        let sub = string_claim(payload, "sub")
            .filter(|s| !s.is_empty())
            .ok_or(ClaimCheck::MissingClaim("sub"))?;
        let iss = string_claim(payload, "iss").ok_or(ClaimCheck::MissingClaim("iss"))?;
        let exp = payload
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or(ClaimCheck::MissingClaim("exp"))?;
        let iat = payload
            .get("iat")
            .and_then(Value::as_i64)
            .ok_or(ClaimCheck::MissingClaim("iat"))?;
        let nbf = payload.get("nbf").and_then(Value::as_i64);

        // `aud` may be a single string or an array. Cognito access tokens carry
        // the app client in `client_id` instead.
        let mut aud = match payload.get("aud") {
            Some(Value::String(single)) => vec![single.clone()],
            Some(Value::Array(many)) => many
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect(),
            _ => Vec::new(),
        };
        if let Some(client_id) = string_claim(payload, "client_id") {
            if !aud.contains(&client_id) {
                aud.push(client_id);
            }
        }

        Ok(Self {
            sub,
            iss,
            aud,
            exp,
            iat,
            nbf,
        })
    }
}

impl ValidatedClaims {
    /// Assemble validated claims from checked registered claims and the
    /// verified payload.
    pub(crate) fn from_parts(registered: RegisteredClaims, raw_claims: Map<String, Value>) -> Self {
        let mut groups = BTreeSet::new();
        for key in ["cognito:groups", "groups"] {
            if let Some(Value::Array(values)) = raw_claims.get(key) {
                groups.extend(
                    values
                        .iter()
                        .filter_map(Value::as_str)
                        .map(ToString::to_string),
                );
            }
        }

        let email = string_claim(&raw_claims, "email");
        let display_name = ["name", "cognito:username", "preferred_username"]
            .into_iter()
            .find_map(|key| string_claim(&raw_claims, key));

        Self {
            subject: registered.sub,
            issuer: registered.iss,
            audience: registered.aud,
            expires_at: registered.exp,
            issued_at: registered.iat,
            groups,
            email,
            display_name,
            raw_claims,
        }
    }
}

fn string_claim(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}
