//! Observability for the auth bridge.
//!
//! Provides metrics definitions and the recorder setup.

pub mod metrics;
