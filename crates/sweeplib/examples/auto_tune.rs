//! Auto-tune to the strongest frequency in a range.
//!
//! Runs a sweep over the configured range, tracks the maximum-power
//! reading, and leaves the instrument tuned there.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p sweeplib --example auto_tune
//! ```

use sweeplib::{format_frequency, FrequencyRange, Instrument, SweepEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let endpoint = "10.0.0.5:5025";

    let instrument = Instrument::builder().spawn();
    let mut events = instrument.subscribe();

    // Print live progress while the tune runs.
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SweepEvent::StepCompleted { sample } => {
                    println!(
                        "  {} -> {:+.3} dBm",
                        format_frequency(sample.frequency_hz),
                        sample.power_dbm
                    );
                }
                SweepEvent::StepSkipped { frequency_hz, raw } => {
                    println!(
                        "  {} -> invalid reply {:?}",
                        format_frequency(frequency_hz),
                        raw
                    );
                }
                SweepEvent::SweepFinished { .. } => break,
                _ => {}
            }
        }
    });

    println!("Connecting to {}...", endpoint);
    let identity = instrument.connect(endpoint).await?;
    println!("Connected: {}\n", identity);

    instrument
        .apply_sweep_params(FrequencyRange::new(2.400e9, 2.420e9, 1e6)?)
        .await?;

    println!("Auto-tuning...");
    let result = instrument.auto_tune().await?;
    progress.await?;

    match result.best {
        Some(best) => println!(
            "\nAuto-tune complete: best = {} at {:+.3} dBm",
            format_frequency(best.frequency_hz),
            best.power_dbm
        ),
        None => println!("\nNo best sample recorded."),
    }

    instrument.disconnect().await?;
    instrument.shutdown().await;
    Ok(())
}
