//! Secret types for credentials that must never reach a log line.
//!
//! Re-exports [`secrecy`] types. The auth bridge wraps every credential it
//! handles in [`SecretString`]: raw bearer tokens pulled from the
//! `Authorization` header and opaque session references read from cookies.
//! Because `SecretString` redacts itself in `Debug`, any struct deriving
//! `Debug` around one is safe to trace.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! enum Credential {
//!     Bearer(SecretString),
//!     Session(SecretString),
//! }
//!
//! let credential = Credential::Bearer(SecretString::from("eyJhbGciOi..."));
//! assert!(!format!("{credential:?}").contains("eyJ"));
//!
//! if let Credential::Bearer(token) = &credential {
//!     assert!(token.expose_secret().starts_with("eyJ"));
//! }
//! ```

pub use secrecy::{ExposeSecret, SecretString};
