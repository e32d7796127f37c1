//! HTTP request handlers for the auth bridge.

pub mod authorize;
pub mod health;
pub mod me;
pub mod metrics;
pub mod session;

pub use authorize::check_permission;
pub use health::{health_check, readiness_check};
pub use me::get_me;
pub use metrics::metrics_handler;
pub use session::{create_session, delete_session};
