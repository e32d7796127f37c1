//! Token Validator: verifies identity provider tokens.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 (Cognito) and EdDSA are accepted, and the header algorithm
//!   must match the resolved key's algorithm
//! - An unknown `kid` after a refresh is a signature failure
//! - Issuer, audience and `exp` are checked exactly after the signature
//!   verifies; `iat` and `nbf` allow for clock skew
//! - Every failure surfaces to clients as the same generic message

use crate::auth::claims::{ClaimCheck, RegisteredClaims, ValidatedClaims};
use crate::auth::jwks::{KeyResolutionError, KeyResolver, SigningAlgorithm};
use crate::errors::AuthError;
use crate::observability::metrics;
use common::jwt::{check_time_window_at, parse_header, TimeWindowViolation};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Validation};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Validates bearer tokens against keys from the [`KeyResolver`].
pub struct TokenValidator {
    resolver: Arc<KeyResolver>,
    clock_skew: Duration,
}

impl TokenValidator {
    pub fn new(resolver: Arc<KeyResolver>, clock_skew: Duration) -> Self {
        Self {
            resolver,
            clock_skew,
        }
    }

    pub fn resolver(&self) -> &Arc<KeyResolver> {
        &self.resolver
    }

    /// Validate `token` issued by `expected_issuer` for `expected_audience`.
    ///
    /// # Errors
    ///
    /// - `MalformedToken` - oversized, not three segments, undecodable header
    ///   or payload
    /// - `KeyResolution` - the key set could not be obtained
    /// - `Signature` - unknown `kid`, unsupported or mismatched algorithm,
    ///   bad signature
    /// - `ClaimValidation` - the first failing claim check
    pub async fn validate(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: &str,
    ) -> Result<ValidatedClaims, AuthError> {
        self.validate_at(
            token,
            expected_issuer,
            expected_audience,
            chrono::Utc::now().timestamp(),
        )
        .await
    }

    /// Deterministic variant of [`TokenValidator::validate`] against an
    /// explicit `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// See [`TokenValidator::validate`].
    #[instrument(skip_all)]
    pub async fn validate_at(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: &str,
        now: i64,
    ) -> Result<ValidatedClaims, AuthError> {
        let result = self
            .verify(token, expected_issuer, expected_audience, now)
            .await;

        match &result {
            Ok(_) => {
                metrics::record_token_validation("success");
                tracing::debug!(target: "bridge.auth.jwt", "Token validated successfully");
            }
            Err(err) => metrics::record_token_validation(err.kind()),
        }

        result
    }

    async fn verify(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: &str,
        now: i64,
    ) -> Result<ValidatedClaims, AuthError> {
        // 1. Header (includes size check via common::jwt)
        let header = parse_header(token).map_err(|e| {
            tracing::debug!(target: "bridge.auth.jwt", error = ?e, "Token header rejected");
            AuthError::MalformedToken(format!("{e:?}"))
        })?;

        let header_alg = match header.alg.as_str() {
            "RS256" => SigningAlgorithm::Rs256,
            "EdDSA" => SigningAlgorithm::EdDsa,
            other => {
                tracing::warn!(target: "bridge.security", alg = %other, "Token uses unsupported algorithm");
                return Err(AuthError::Signature(format!("unsupported algorithm {other}")));
            }
        };

        // 2. Key lookup
        let key = match self.resolver.get_key(&header.kid).await {
            Ok(key) => key,
            Err(KeyResolutionError::UnknownKey) => {
                tracing::warn!(target: "bridge.security", kid = %header.kid, "Token signed with unknown key");
                return Err(AuthError::Signature("unknown signing key".to_string()));
            }
            Err(err) => return Err(AuthError::KeyResolution(err)),
        };

        if key.algorithm != header_alg {
            tracing::warn!(
                target: "bridge.security",
                kid = %header.kid,
                header_alg = header_alg.as_str(),
                key_alg = key.algorithm.as_str(),
                "Token algorithm does not match signing key"
            );
            return Err(AuthError::Signature("algorithm mismatch".to_string()));
        }

        // 3. Signature. Registered-claim checks are done below so they run in
        // a fixed order with our own skew handling.
        let mut validation = Validation::new(key.algorithm.jwt_algorithm());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let payload = decode::<Map<String, Value>>(token, key.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::InvalidToken => {
                    tracing::debug!(target: "bridge.auth.jwt", error = %e, "Token payload undecodable");
                    AuthError::MalformedToken(e.to_string())
                }
                _ => {
                    tracing::warn!(target: "bridge.security", kid = %header.kid, error = %e, "Token signature verification failed");
                    AuthError::Signature(e.to_string())
                }
            })?
            .claims;

        // 4. Claims
        let registered = RegisteredClaims::from_payload(&payload).map_err(claim_failure)?;

        if registered.iss != expected_issuer {
            return Err(claim_failure(ClaimCheck::Issuer));
        }

        if !registered.aud.iter().any(|aud| aud == expected_audience) {
            return Err(claim_failure(ClaimCheck::Audience));
        }

        check_time_window_at(
            registered.iat,
            registered.exp,
            registered.nbf,
            self.clock_skew,
            now,
        )
        .map_err(|violation| match violation {
            TimeWindowViolation::Expired => claim_failure(ClaimCheck::Expired),
            TimeWindowViolation::NotYetValid => claim_failure(ClaimCheck::NotYetValid),
        })?;

        Ok(ValidatedClaims::from_parts(registered, payload))
    }
}

fn claim_failure(check: ClaimCheck) -> AuthError {
    tracing::debug!(target: "bridge.auth.jwt", check = %check, "Token claim check failed");
    AuthError::ClaimValidation(check)
}
