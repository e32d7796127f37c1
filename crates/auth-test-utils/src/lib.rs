//! # Auth Bridge Test Utilities
//!
//! Shared test utilities for the LearnTrac auth bridge.
//!
//! This crate provides:
//! - Deterministic Ed25519 keypairs that sign tokens and publish JWKs
//! - Cognito-shaped claim builders (TestTokenBuilder)
//! - A mock identity provider JWKS endpoint (MockJwksServer)
//! - Custom assertions for rejection bodies and tokens
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let keypair = TestKeypair::new(1, "key-1");
//!     let idp = MockJwksServer::start().await;
//!     idp.serve_keys(&[&keypair]).await;
//!
//!     let token = keypair.sign(
//!         &TestTokenBuilder::new()
//!             .for_user("alice")
//!             .in_groups(&["students"])
//!             .build(),
//!     );
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod jwks_server;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use token_builders::*;
