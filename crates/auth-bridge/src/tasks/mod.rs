//! Background tasks for the auth bridge.
//!
//! # Tasks
//!
//! - `session_sweeper` - Periodically removes lapsed sessions

pub mod session_sweeper;

pub use session_sweeper::start_session_sweeper;
