//! # RPKI Validation Module
//!
//! Clients that answer "may this AS originate this prefix?".
//!
//! - **`routinator`**: HTTP client for Routinator's `/validity` endpoint.

/// Routinator `/validity` client.
pub mod routinator;

pub use routinator::{RoutinatorValidator, ValidatorEndpoint, ValidatorError};
