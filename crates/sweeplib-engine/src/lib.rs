//! sweeplib-engine: the sweep engine, auto-tuner, and periodic poller.
//!
//! The pieces, leaves first:
//!
//! - [`sweep`] -- one deterministic pass over a frequency range
//! - [`tuner`] -- a pass that tracks the best sample and tunes the device to it
//! - [`poller`] -- the Stopped/Running/Suspended state machine
//! - [`worker`] -- the single instrument-worker task that owns the session
//!   and serializes every exchange; [`Instrument`] is its public handle

pub mod poller;
pub mod sweep;
pub mod tuner;
pub mod worker;

pub use poller::Poller;
pub use sweep::{SweepConfig, SweepEngine, DEFAULT_SETTLE_DELAY};
pub use tuner::AutoTuner;
pub use worker::{Instrument, InstrumentBuilder, Snapshot, DEFAULT_POLL_INTERVAL};
