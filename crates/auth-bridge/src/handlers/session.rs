//! Session login and logout.
//!
//! `POST /api/v1/session` exchanges a bearer token for a host session cookie.
//! `DELETE /api/v1/session` ends the caller's session and clears the cookie.

use crate::errors::AuthError;
use crate::gate::{Credential, HostAuthenticator, Principal};
use crate::middleware::extract_credential;
use crate::routes::AppState;
use crate::session::Session;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /api/v1/session
///
/// Requires a bearer token; a session cookie alone cannot mint a session.
///
/// # Response
///
/// 200 with the session summary and a `Set-Cookie` carrying the session id.
#[instrument(skip_all, name = "bridge.session.create")]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let token = match extract_credential(&headers, &state.config.session_cookie_name) {
        Ok(Some(Credential::Bearer(token))) => token,
        Ok(_) => {
            let err = AuthError::MissingCredentials("login requires a bearer token".to_string());
            state.gate.record_rejection(&err, "none");
            return Err(err);
        }
        Err(err) => {
            state.gate.record_rejection(&err, "bearer");
            return Err(err);
        }
    };

    let session = state.gate.login(&token).await?;
    let now = chrono::Utc::now().timestamp();
    let cookie = session_cookie(
        &state.config.session_cookie_name,
        &session.session_id,
        session.remaining_seconds(now),
        state.config.session_cookie_secure,
    )?;

    Ok(([(header::SET_COOKIE, cookie)], Json::<Session>(session)).into_response())
}

/// Handler for DELETE /api/v1/session
///
/// # Response
///
/// 204 with a `Set-Cookie` that expires the session cookie. Idempotent.
#[instrument(skip_all, name = "bridge.session.delete")]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, AuthError> {
    state.gate.on_logout(&principal).await?;

    let cookie = session_cookie(
        &state.config.session_cookie_name,
        "",
        0,
        state.config.session_cookie_secure,
    )?;

    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

/// Build the `Set-Cookie` value for the session cookie.
fn session_cookie(
    name: &str,
    value: &str,
    max_age: i64,
    secure: bool,
) -> Result<HeaderValue, AuthError> {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| {
        tracing::error!(target: "bridge.session", error = %e, "Invalid session cookie value");
        AuthError::Internal
    })
}
