//! Asynchronous sweep event types.
//!
//! Events are emitted by the instrument worker through a
//! `tokio::sync::broadcast` channel as sweeps progress. A UI, CLI, or
//! test harness subscribes to these for live updates without polling.

use crate::types::{PollerState, Sample, SweepResult};

/// An event emitted by the instrument worker.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events under load (e.g. very short
/// poll intervals with many steps per sweep).
#[derive(Debug, Clone)]
pub enum SweepEvent {
    /// A connection to the instrument was established.
    Connected {
        /// The instrument's `*IDN?` identification string.
        identity: String,
    },

    /// The connection to the instrument was closed or lost.
    Disconnected,

    /// One sweep step completed with a valid reading.
    StepCompleted {
        /// The sample produced by this step.
        sample: Sample,
    },

    /// A step's reply could not be parsed; the step was skipped and the
    /// sweep continued.
    StepSkipped {
        /// The frequency the instrument was tuned to, in hertz.
        frequency_hz: f64,
        /// The raw reply text that failed to parse.
        raw: String,
    },

    /// A sweep pass finished (complete or interrupted at a step boundary).
    SweepFinished {
        /// Samples collected during the pass.
        result: SweepResult,
    },

    /// The instrument reported its marker frequency after a poll cycle.
    MarkerFrequency {
        /// Marker position in hertz.
        frequency_hz: f64,
    },

    /// The poller changed state.
    PollerChanged {
        /// The new poller state.
        state: PollerState,
    },

    /// A human-readable status message (recoverable anomalies, cycle
    /// errors). These never carry stack traces, only short descriptions.
    Status {
        /// The status text.
        message: String,
    },
}
