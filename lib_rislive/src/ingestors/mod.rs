//! # Data Ingestors Module
//!
//! Clients for the live data sources this crate consumes. Each submodule owns
//! the connection lifecycle of one source and hands decoded messages to the
//! rest of the pipeline through a bounded queue.
//!
//! ## Contained Modules:
//! - **`ris_live`**: a resilient WebSocket client for the RIPE RIS Live BGP
//!   stream, with one-shot reconnect, an application heartbeat and a hard
//!   session deadline.

/// The WebSocket client for the RIS Live BGP stream.
pub mod ris_live;

// --- Public API Re-exports ---
pub use ris_live::{RisLiveHandle, StreamConfig, StreamError, StreamState};
