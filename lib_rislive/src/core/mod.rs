//! # Core Engine Module
//!
//! The parts of the pipeline that do not touch the network directly.
//!
//! - **`kill_switch`**: the one cross-task signal. Tripped by the session
//!   deadline, by a failed reconnect or by the operator; every loop checks it.
//! - **`ingestion`**: the consumer that turns queued RIS Live messages into
//!   (origin AS, prefix) facts and applies the validation policy.
//! - **`sink`**: the append-only `result` file writer.

/// Cooperative cancellation shared by the stream handle and the consumer.
pub mod kill_switch;
/// The consumer loop and its emission policies.
pub mod ingestion;
/// Fact output.
pub mod sink;

pub use ingestion::{EmitPolicy, IngestOptions, IngestStats, Ingestor, OriginValidator, UnknownPolicy};
pub use kill_switch::KillSwitch;
pub use sink::{Fact, ResultWriter};
