//! Watch periodic sweep cycles as an event stream.
//!
//! Starts the poller and prints every event it emits for thirty seconds:
//! per-step progress, end-of-sweep results, marker-frequency updates, and
//! any status messages. This is the shape of integration a plotting UI
//! would use.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p sweeplib --example watch_poller
//! ```

use std::time::Duration;

use sweeplib::{format_frequency, FrequencyRange, Instrument, SweepEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let endpoint = "10.0.0.5:5025";

    let instrument = Instrument::builder()
        .poll_interval(Duration::from_millis(1000))
        .spawn();
    let mut events = instrument.subscribe();

    let identity = instrument.connect(endpoint).await?;
    println!("Connected: {}", identity);

    instrument
        .apply_sweep_params(FrequencyRange::new(2.400e9, 2.420e9, 2e6)?)
        .await?;
    instrument.start_polling().await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let event = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            event = events.recv() => match event {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        match event {
            SweepEvent::StepCompleted { sample } => {
                println!(
                    "step  {} {:+.3} dBm",
                    format_frequency(sample.frequency_hz),
                    sample.power_dbm
                );
            }
            SweepEvent::StepSkipped { frequency_hz, raw } => {
                println!("skip  {} ({:?})", format_frequency(frequency_hz), raw);
            }
            SweepEvent::SweepFinished { result } => {
                println!("sweep done: {} samples", result.samples.len());
            }
            SweepEvent::MarkerFrequency { frequency_hz } => {
                println!("marker at {}", format_frequency(frequency_hz));
            }
            SweepEvent::PollerChanged { state } => println!("poller {state}"),
            SweepEvent::Connected { identity } => println!("connected: {identity}"),
            SweepEvent::Disconnected => println!("disconnected"),
            SweepEvent::Status { message } => println!("status: {message}"),
        }
    }

    instrument.stop_polling().await?;
    instrument.disconnect().await?;
    instrument.shutdown().await;
    Ok(())
}
