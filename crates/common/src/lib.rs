//! Common utilities shared across the LearnTrac auth bridge crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (header parsing, time windows, key decoding)
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;
