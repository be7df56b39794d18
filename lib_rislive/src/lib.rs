//! # lib_rislive
//!
//! Building blocks for watching the RIPE RIS Live BGP stream and checking each
//! announced (origin AS, prefix) pair against an RPKI validator.
//!
//! ## Modules:
//! - **`protocol`**: the RIS Live wire messages (client directives, server events).
//! - **`core`**: the kill switch, the ingestion loop and the result sink.
//! - **`ingestors`**: the long-lived WebSocket stream handle (feature `ingestors`).
//! - **`retrieve`**: the generic retrying HTTP client (feature `retrieve`).
//! - **`validate`**: the Routinator validity client (feature `validate`).

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod core;
pub mod protocol;

#[cfg(feature = "ingestors")]
pub mod ingestors;
#[cfg(feature = "retrieve")]
pub mod retrieve;
#[cfg(feature = "validate")]
pub mod validate;

// Re-export the types most callers need.
pub use crate::core::ingestion::{EmitPolicy, IngestStats, Ingestor, UnknownPolicy};
pub use crate::core::kill_switch::KillSwitch;
pub use crate::core::sink::{Fact, ResultWriter};
pub use crate::protocol::ris_message::{ClientDirective, ClientMessage, ServerEvent, ServerMessage};
pub use crate::protocol::validity::Verdict;
