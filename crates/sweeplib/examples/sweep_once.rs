//! Single sweep with peak-power readings.
//!
//! Demonstrates driving the [`Session`] and [`SweepEngine`] directly,
//! without the worker task: connect, sweep the range once, print a table
//! of readings with a bar graph.
//!
//! # Requirements
//!
//! - An instrument exposing its SCPI socket (default port 5025)
//! - The address below adjusted for your bench
//!
//! # Usage
//!
//! ```sh
//! cargo run -p sweeplib --example sweep_once
//! ```

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use sweeplib::engine::{SweepConfig, SweepEngine};
use sweeplib::{format_frequency, FrequencyRange, Session};

/// Sweep parameters.
const START_HZ: f64 = 2.400e9; // 2.400 GHz
const STOP_HZ: f64 = 2.420e9; // 2.420 GHz
const STEP_HZ: f64 = 1e6; // 1 MHz steps

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let endpoint = "10.0.0.5:5025";

    println!("Connecting to {}...", endpoint);
    let mut session = Session::new();
    let identity = session.connect(endpoint).await?;
    println!("Connected: {}\n", identity);

    let range = FrequencyRange::new(START_HZ, STOP_HZ, STEP_HZ)?;
    println!(
        "Sweeping {} - {} in {} steps...\n",
        format_frequency(range.start_hz()),
        format_frequency(range.stop_hz()),
        format_frequency(range.step_hz())
    );

    println!("{:<14} {:>10}", "Frequency", "Peak");
    println!("{:-<14} {:-<10}", "", "");

    let engine = SweepEngine::new(SweepConfig {
        settle_delay: Duration::from_millis(200),
    });
    let (events, _) = broadcast::channel(64);
    let result = engine
        .run(&mut session, &range, &events, &CancellationToken::new())
        .await?;

    for sample in &result.samples {
        // A simple bar graph: one # per 2 dB above -100 dBm.
        let bar_len = ((sample.power_dbm + 100.0) / 2.0).max(0.0) as usize;
        let bar: String = "#".repeat(bar_len.min(40));

        println!(
            "{:>12} {:>+7.1} dBm  {}",
            format_frequency(sample.frequency_hz),
            sample.power_dbm,
            bar
        );
    }

    println!("\n{} valid samples.", result.samples.len());
    session.disconnect().await;
    Ok(())
}
