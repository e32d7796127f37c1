//! Auth bridge error types.
//!
//! All errors map to a stable `{error_kind, message}` body and HTTP status via
//! the `IntoResponse` impl. Client-facing messages are intentionally generic:
//! they never say which check failed. The precise reason is logged
//! server-side by the component that produced the error and by the gate.

use crate::auth::claims::ClaimCheck;
use crate::auth::jwks::KeyResolutionError;
use crate::auth::mapping::Permission;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Generic message for every bearer-token rejection.
pub const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Auth bridge error type.
///
/// Maps to HTTP status codes:
/// - KeyResolution, MalformedToken, Signature, ClaimValidation,
///   SessionExpired, MissingCredentials: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - BadRequest: 400 Bad Request
/// - StoreUnavailable: 503 Service Unavailable
/// - MappingPolicyViolation, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Key resolution failed: {0}")]
    KeyResolution(#[from] KeyResolutionError),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Claim validation failed: {0}")]
    ClaimValidation(ClaimCheck),

    #[error("Session expired or unknown")]
    SessionExpired,

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Forbidden: missing permission {0}")]
    Forbidden(Permission),

    #[error("Mapping policy violation: {0}")]
    MappingPolicyViolation(String),

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::KeyResolution(_)
            | AuthError::MalformedToken(_)
            | AuthError::Signature(_)
            | AuthError::ClaimValidation(_)
            | AuthError::SessionExpired
            | AuthError::MissingCredentials(_) => 401,
            AuthError::Forbidden(_) => 403,
            AuthError::BadRequest(_) => 400,
            AuthError::StoreUnavailable(_) => 503,
            AuthError::MappingPolicyViolation(_) | AuthError::Internal => 500,
        }
    }

    /// Bounded label for logs and metrics. Never sent to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::KeyResolution(_) => "key_resolution",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::Signature(_) => "signature",
            AuthError::ClaimValidation(_) => "claim_validation",
            AuthError::SessionExpired => "session_expired",
            AuthError::MissingCredentials(_) => "missing_credentials",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::MappingPolicyViolation(_) => "mapping_policy_violation",
            AuthError::StoreUnavailable(_) => "store_unavailable",
            AuthError::BadRequest(_) => "bad_request",
            AuthError::Internal => "internal",
        }
    }

    /// Whether the gate may retry the operation that produced this error.
    ///
    /// Only key resolution failures are transient. Signature and claim
    /// failures are deterministic for a given token.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::KeyResolution(
                KeyResolutionError::Unavailable(_) | KeyResolutionError::Malformed(_)
            )
        )
    }
}

/// Rejection body returned to callers.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_kind: &'static str,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_kind, message) = match &self {
            AuthError::KeyResolution(_)
            | AuthError::MalformedToken(_)
            | AuthError::Signature(_)
            | AuthError::ClaimValidation(_) => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                INVALID_TOKEN_MESSAGE.to_string(),
            ),
            AuthError::SessionExpired => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "The session is invalid or expired".to_string(),
            ),
            AuthError::MissingCredentials(_) => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "Authentication required".to_string(),
            ),
            AuthError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "Insufficient permissions".to_string(),
            ),
            AuthError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "bad_request", reason.clone())
            }
            AuthError::StoreUnavailable(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "bridge.availability", reason = %reason, "Session store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "Service temporarily unavailable".to_string(),
                )
            }
            AuthError::MappingPolicyViolation(_) | AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error_kind,
                message,
            }),
        )
            .into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"learntrac\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
