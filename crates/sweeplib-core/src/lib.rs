//! sweeplib-core: Core traits, types, and error definitions for sweeplib.
//!
//! This crate defines the transport-agnostic abstractions the rest of the
//! workspace builds on. Applications depend on these types without pulling
//! in the TCP transport or the sweep engine.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`FrequencyRange`] / [`Sample`] / [`SweepResult`] -- sweep values
//! - [`SweepEvent`] -- asynchronous progress notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod helpers;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use sweeplib_core::*`.
pub use error::{Error, Result};
pub use events::SweepEvent;
pub use helpers::format_frequency;
pub use transport::Transport;
pub use types::{
    FrequencyRange, FrequencyUnit, PollerState, Sample, SessionState, SweepResult,
};
