//! Forward-auth permission check for the host.
//!
//! The host (or a reverse proxy in front of it) asks whether the current
//! principal holds a named permission before serving a Trac page.

use crate::auth::mapping::Permission;
use crate::errors::AuthError;
use crate::gate::{HostAuthenticator, Principal};
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Extension;
use std::sync::Arc;

/// Handler for GET /api/v1/authorize/{permission}
///
/// # Response
///
/// - 204 No Content if the permission is held
/// - 403 Forbidden if it is not
/// - 400 Bad Request if the name is not a known permission
pub async fn check_permission(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(name): Path<String>,
) -> Result<StatusCode, AuthError> {
    let permission: Permission = name
        .parse()
        .map_err(|_| AuthError::BadRequest("Unknown permission".to_string()))?;

    state.gate.authorize(&principal, permission).map_err(|err| {
        state
            .gate
            .record_rejection(&err, principal.auth_method.as_str());
        err
    })?;

    Ok(StatusCode::NO_CONTENT)
}
