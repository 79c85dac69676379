//! One deterministic sweep pass over a frequency range.
//!
//! Step frequencies come from the range's step index, not from
//! accumulating the step value, so every pass visits exactly
//! `floor((stop-start)/step)+1` frequencies with no floating-point drift.
//! A loop accumulating `freq += step` can over- or undershoot the stop
//! bound; the range tests in `sweeplib-core` pin the index form down.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use sweeplib_core::error::{Error, Result};
use sweeplib_core::events::SweepEvent;
use sweeplib_core::types::{FrequencyRange, Sample, SweepResult};
use sweeplib_scpi::Session;

/// Wait after tuning before reading the marker, so the instrument has
/// settled on the new frequency.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Timing configuration for a sweep pass.
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    /// Delay between tuning and reading at each step.
    pub settle_delay: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Executes sweep passes over a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepEngine {
    config: SweepConfig,
}

impl SweepEngine {
    /// Create an engine with the given timing configuration.
    pub fn new(config: SweepConfig) -> Self {
        SweepEngine { config }
    }

    /// Run one pass over `range`, emitting a progress event after every
    /// step.
    ///
    /// Per step: tune, wait the settle delay, read the peak-power marker.
    /// A reply that fails to parse skips that step (a
    /// [`SweepEvent::StepSkipped`] is emitted) and the pass continues;
    /// any other session error aborts the pass immediately with that
    /// error. Samples collected before an abort have already been
    /// delivered through [`SweepEvent::StepCompleted`] events.
    ///
    /// `interrupt` is checked before each step, so a stop or disconnect
    /// is observed within one step boundary; an interrupted pass returns
    /// the samples collected so far.
    pub async fn run(
        &self,
        session: &mut Session,
        range: &FrequencyRange,
        events: &broadcast::Sender<SweepEvent>,
        interrupt: &CancellationToken,
    ) -> Result<SweepResult> {
        let steps = range.step_count();
        let mut samples = Vec::with_capacity(steps);

        tracing::debug!(
            start_hz = range.start_hz(),
            stop_hz = range.stop_hz(),
            step_hz = range.step_hz(),
            steps,
            "starting sweep pass"
        );

        for index in 0..steps {
            if interrupt.is_cancelled() {
                tracing::debug!(index, collected = samples.len(), "sweep pass interrupted");
                break;
            }

            let frequency_hz = range.frequency_at(index);
            session.set_frequency(frequency_hz).await?;

            tokio::time::sleep(self.config.settle_delay).await;

            match session.read_peak_power().await {
                Ok(power_dbm) => {
                    let sample = Sample {
                        frequency_hz,
                        power_dbm,
                    };
                    samples.push(sample);
                    let _ = events.send(SweepEvent::StepCompleted { sample });
                }
                Err(Error::Parse { raw }) => {
                    tracing::debug!(frequency_hz, raw = %raw, "skipping unparseable reading");
                    let _ = events.send(SweepEvent::StepSkipped { frequency_hz, raw });
                }
                Err(e) => {
                    tracing::warn!(frequency_hz, error = %e, "sweep pass aborted");
                    return Err(e);
                }
            }
        }

        Ok(SweepResult {
            samples,
            best: None,
        })
    }
}
