//! # Wire Protocol Module
//!
//! Typed shapes for every payload that crosses a process boundary:
//!
//! - **`ris_message`**: RIS Live client directives and server messages,
//!   including the AS-PATH decoding rules and origin/prefix extraction.
//! - **`validity`**: the Routinator `/validity` response and the tri-state
//!   `Verdict` derived from it.

/// RIS Live client and server messages.
pub mod ris_message;
/// RPKI validity responses and verdicts.
pub mod validity;
