//! Token authentication for the auth bridge.
//!
//! - `jwks` resolves the identity provider's signing keys
//! - `jwt` verifies bearer tokens against those keys
//! - `claims` holds the verified claim set
//! - `mapping` turns identity-provider groups into host permissions

pub mod claims;
pub mod jwks;
pub mod jwt;
pub mod mapping;

pub use claims::{ClaimCheck, ValidatedClaims};
pub use jwks::{HttpJwksFetcher, JwksFetcher, KeyResolutionError, KeyResolver, KeyResolverConfig};
pub use jwt::TokenValidator;
pub use mapping::{ClaimMapper, Permission};
