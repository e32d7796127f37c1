//! Middleware for the auth bridge.
//!
//! # Components
//!
//! - `auth` - Request gate middleware for protected routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod auth;
pub mod http_metrics;

pub use auth::{
    extract_credential, require_authenticated, require_permission, AuthState, PermissionGuard,
    PrincipalExt,
};
pub use http_metrics::http_metrics_middleware;
