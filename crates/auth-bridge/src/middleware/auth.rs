//! Gate middleware for protected routes.
//!
//! Provides two middleware functions:
//! - `require_authenticated` - any authenticated principal
//! - `require_permission` - a principal holding a route-scoped permission
//!
//! Both read the credential (bearer token first, then the session cookie),
//! run the request gate, and insert the resulting `Principal` into request
//! extensions.

use crate::auth::mapping::Permission;
use crate::errors::AuthError;
use crate::gate::{Credential, Principal, RequestGate};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use common::secret::SecretString;
use std::sync::Arc;
use tracing::instrument;

/// State for the gate middleware.
#[derive(Clone)]
pub struct AuthState {
    pub gate: Arc<RequestGate>,
    pub cookie_name: Arc<str>,
}

/// State for [`require_permission`]: the gate plus the permission the
/// guarded routes need.
#[derive(Clone)]
pub struct PermissionGuard {
    pub auth: AuthState,
    pub required: Permission,
}

impl PermissionGuard {
    pub fn new(auth: AuthState, required: Permission) -> Self {
        Self { auth, required }
    }
}

/// Read the request's credential.
///
/// An `Authorization: Bearer` header wins over the session cookie. Other
/// `Authorization` schemes are ignored.
///
/// # Errors
///
/// `MalformedToken` if the bearer header carries no token.
pub fn extract_credential(
    headers: &HeaderMap,
    cookie_name: &str,
) -> Result<Option<Credential>, AuthError> {
    if let Some(auth_header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some((scheme, token)) = auth_header.split_once(' ') {
            if scheme.eq_ignore_ascii_case("bearer") {
                let token = token.trim();
                if token.is_empty() {
                    tracing::debug!(target: "bridge.gate", "Empty bearer token");
                    return Err(AuthError::MalformedToken(
                        "Invalid Authorization header format".to_string(),
                    ));
                }
                return Ok(Some(Credential::Bearer(SecretString::from(
                    token.to_string(),
                ))));
            }
        }
        tracing::debug!(target: "bridge.gate", "Ignoring non-bearer Authorization header");
    }

    Ok(find_cookie(headers, cookie_name)
        .map(|value| Credential::Session(SecretString::from(value.to_string()))))
}

fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

async fn gate_request(
    auth: &AuthState,
    mut req: Request,
    next: Next,
    required: Option<Permission>,
) -> Result<axum::response::Response, AuthError> {
    let credential = extract_credential(req.headers(), &auth.cookie_name).inspect_err(|err| {
        auth.gate.record_rejection(err, "bearer");
    })?;

    let principal = auth.gate.check(credential, required).await?;

    // Store principal in request extensions for downstream handlers
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Gate middleware requiring any authenticated principal.
///
/// # Response
///
/// - Returns 401 Unauthorized if the credential is missing or invalid
/// - Continues to next handler with `Principal` in extensions otherwise
#[instrument(skip_all, name = "bridge.middleware.authenticated")]
pub async fn require_authenticated(
    State(state): State<AuthState>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthError> {
    gate_request(&state, req, next, None).await
}

/// Gate middleware requiring the guard's permission.
///
/// # Response
///
/// - Returns 401 Unauthorized if the credential is missing or invalid
/// - Returns 403 Forbidden if the permission is not held
/// - Continues to next handler with `Principal` in extensions otherwise
#[instrument(skip_all, name = "bridge.middleware.permission")]
pub async fn require_permission(
    State(guard): State<PermissionGuard>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthError> {
    gate_request(&guard.auth, req, next, Some(guard.required)).await
}

/// Extension trait for extracting the principal from a request.
pub trait PrincipalExt {
    /// Get the authorized principal from request extensions.
    ///
    /// Returns `None` if gate middleware was not applied to this request.
    fn principal(&self) -> Option<&Principal>;
}

impl<B> PrincipalExt for axum::extract::Request<B> {
    fn principal(&self) -> Option<&Principal> {
        self.extensions().get::<Principal>()
    }
}
