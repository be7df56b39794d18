//! # Data Retrieval Module
//!
//! Generic HTTP plumbing shared by the clients of external services.
//!
//! - **`ky_http`**: an `ApiClient` built on `reqwest` and `reqwest-middleware`,
//!   with optional exponential-backoff retries and a per-request timeout. The
//!   RPKI validity client is built on top of it.

/// Generic HTTP API client with retry middleware.
pub mod ky_http;
