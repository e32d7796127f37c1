//! Current principal endpoint.

use crate::gate::Principal;
use axum::{Extension, Json};

/// Handler for GET /api/v1/me
///
/// Returns the principal the gate resolved for this request.
pub async fn get_me(Extension(principal): Extension<Principal>) -> Json<Principal> {
    Json(principal)
}
