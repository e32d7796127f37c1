//! LearnTrac Auth Bridge Library
//!
//! Validates identity-provider tokens, maps provider groups onto LearnTrac
//! permissions and gates every request to the host ticketing application.
//!
//! # Modules
//!
//! - `auth` - Signing keys, token validation and the group to permission table
//! - `config` - Service configuration
//! - `errors` - Error types
//! - `gate` - Per-request authentication and authorization
//! - `handlers` - HTTP request handlers
//! - `middleware` - Axum middleware (auth gate, HTTP metrics)
//! - `observability` - Prometheus metrics
//! - `routes` - Router and application state
//! - `session` - Server-side sessions
//! - `tasks` - Background tasks

pub mod auth;
pub mod config;
pub mod errors;
pub mod gate;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod session;
pub mod tasks;
