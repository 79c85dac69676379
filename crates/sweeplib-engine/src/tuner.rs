//! Auto-tune: sweep, track the best sample, command the device to it.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use sweeplib_core::error::{Error, Result};
use sweeplib_core::events::SweepEvent;
use sweeplib_core::types::{FrequencyRange, Sample, SweepResult};
use sweeplib_scpi::Session;

use crate::sweep::{SweepConfig, SweepEngine};

/// Runs a sweep and leaves the instrument tuned to the strongest
/// frequency found.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoTuner {
    engine: SweepEngine,
}

impl AutoTuner {
    /// Create a tuner using the same timing configuration as the sweep
    /// engine (identical settle delay and parse-failure policy).
    pub fn new(config: SweepConfig) -> Self {
        AutoTuner {
            engine: SweepEngine::new(config),
        }
    }

    /// Sweep `range`, then tune the device to the maximum-power sample.
    ///
    /// The returned result has `best` populated. With zero valid samples
    /// (every reply unparseable, or the pass interrupted before the first
    /// step) the device frequency is left unchanged and the error is
    /// [`Error::NoValidSamples`]. An interrupted pass with at least one
    /// valid sample still tunes to the best found so far. Fatal session
    /// errors abort without touching the device frequency.
    pub async fn run(
        &self,
        session: &mut Session,
        range: &FrequencyRange,
        events: &broadcast::Sender<SweepEvent>,
        interrupt: &CancellationToken,
    ) -> Result<SweepResult> {
        let mut result = self.engine.run(session, range, events, interrupt).await?;

        let best = pick_best(&result.samples).ok_or(Error::NoValidSamples)?;

        tracing::info!(
            frequency_hz = best.frequency_hz,
            power_dbm = best.power_dbm,
            "auto-tune commanding best frequency"
        );
        session.set_frequency(best.frequency_hz).await?;

        result.best = Some(best);
        Ok(result)
    }
}

/// The maximum-power sample, first-seen winning exact ties.
pub fn pick_best(samples: &[Sample]) -> Option<Sample> {
    let mut best: Option<Sample> = None;
    for &sample in samples {
        let better = match best {
            None => true,
            Some(current) => sample.power_dbm > current.power_dbm,
        };
        if better {
            best = Some(sample);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use sweeplib_test_harness::MockTransport;

    fn fast_tuner() -> AutoTuner {
        AutoTuner::new(SweepConfig {
            settle_delay: Duration::from_millis(0),
        })
    }

    fn expect_step(mock: &mut MockTransport, freq: &str, reply: &[u8]) {
        mock.expect(format!(":FREQ {freq}\n").as_bytes(), b"");
        mock.expect(b":CALC:MARK1:MAX\n", b"");
        mock.expect(b":CALC:MARK1:Y?\n", reply);
    }

    async fn connected_session(load: impl FnOnce(&mut MockTransport)) -> Session {
        let mut mock = MockTransport::new();
        mock.expect(b"*IDN?\n", b"Acme,SA-2400,0042,1.03\n");
        load(&mut mock);

        let mut session = Session::new();
        session
            .connect_with_transport(Box::new(mock))
            .await
            .unwrap();
        session
    }

    fn test_range() -> FrequencyRange {
        FrequencyRange::new(2.400e9, 2.420e9, 10e6).unwrap()
    }

    #[test]
    fn pick_best_finds_the_maximum() {
        let samples = [
            Sample {
                frequency_hz: 1.0,
                power_dbm: -42.0,
            },
            Sample {
                frequency_hz: 2.0,
                power_dbm: -38.5,
            },
            Sample {
                frequency_hz: 3.0,
                power_dbm: -40.1,
            },
        ];
        let best = pick_best(&samples).unwrap();
        assert_eq!(best.frequency_hz, 2.0);
        assert_eq!(best.power_dbm, -38.5);
    }

    #[test]
    fn pick_best_keeps_first_on_exact_tie() {
        let samples = [
            Sample {
                frequency_hz: 1.0,
                power_dbm: -38.5,
            },
            Sample {
                frequency_hz: 2.0,
                power_dbm: -38.5,
            },
        ];
        let best = pick_best(&samples).unwrap();
        assert_eq!(best.frequency_hz, 1.0);
    }

    #[test]
    fn pick_best_of_nothing_is_none() {
        assert!(pick_best(&[]).is_none());
    }

    #[tokio::test]
    async fn tunes_to_the_strongest_frequency() {
        // End-to-end scenario: -42.0, -38.5, -40.1 -> best is 2.410 GHz,
        // and the device is commanded there after the pass.
        let mut session = connected_session(|mock| {
            expect_step(mock, "2400000000", b"-42.0\n");
            expect_step(mock, "2410000000", b"-38.5\n");
            expect_step(mock, "2420000000", b"-40.1\n");
            mock.expect(b":FREQ 2410000000\n", b"");
        })
        .await;

        let (events, _rx) = broadcast::channel(32);
        let result = fast_tuner()
            .run(
                &mut session,
                &test_range(),
                &events,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.samples.len(), 3);
        let best = result.best.unwrap();
        assert_eq!(best.frequency_hz, 2.410e9);
        assert_eq!(best.power_dbm, -38.5);
    }

    #[tokio::test]
    async fn skipped_step_is_excluded_from_best() {
        // The would-be winner replies garbage; best comes from the rest.
        let mut session = connected_session(|mock| {
            expect_step(mock, "2400000000", b"-42.0\n");
            expect_step(mock, "2410000000", b"ERR\n");
            expect_step(mock, "2420000000", b"-40.1\n");
            mock.expect(b":FREQ 2420000000\n", b"");
        })
        .await;

        let (events, _rx) = broadcast::channel(32);
        let result = fast_tuner()
            .run(
                &mut session,
                &test_range(),
                &events,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.samples.len(), 2);
        assert_eq!(result.best.unwrap().frequency_hz, 2.420e9);
    }

    #[tokio::test]
    async fn all_unparseable_fails_without_touching_the_device() {
        // No final :FREQ command is scripted: sending one would fail the
        // mock with an exhausted-expectations error.
        let mut session = connected_session(|mock| {
            expect_step(mock, "2400000000", b"ERR\n");
            expect_step(mock, "2410000000", b"ERR\n");
            expect_step(mock, "2420000000", b"ERR\n");
        })
        .await;

        let (events, _rx) = broadcast::channel(32);
        let result = fast_tuner()
            .run(
                &mut session,
                &test_range(),
                &events,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(Error::NoValidSamples)));
    }

    #[tokio::test]
    async fn fatal_error_propagates_without_tuning() {
        let mut session = connected_session(|mock| {
            expect_step(mock, "2400000000", b"-42.0\n");
            // The instrument goes silent on the second step.
            mock.expect(b":FREQ 2410000000\n", b"");
            mock.expect(b":CALC:MARK1:MAX\n", b"");
            mock.expect(b":CALC:MARK1:Y?\n", b"");
        })
        .await;

        let (events, _rx) = broadcast::channel(32);
        let result = fast_tuner()
            .run(
                &mut session,
                &test_range(),
                &events,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(Error::Timeout)));
    }
}
