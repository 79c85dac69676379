//! # sweeplib -- SCPI Sweep and Auto-Tune for Bench Instruments
//!
//! `sweeplib` is an asynchronous Rust library for driving a spectrum
//! analyzer or signal generator over its raw SCPI socket (TCP port 5025):
//! sweep a frequency range reading the peak-power marker at each step,
//! auto-tune to the strongest frequency, and repeat sweeps on a fixed
//! cadence for live displays.
//!
//! ## Quick Start
//!
//! Add `sweeplib` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sweeplib = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect and run one auto-tune:
//!
//! ```no_run
//! use std::time::Duration;
//! use sweeplib::{FrequencyRange, Instrument};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let instrument = Instrument::builder()
//!         .poll_interval(Duration::from_millis(1000))
//!         .spawn();
//!
//!     let identity = instrument.connect("10.0.0.5").await?;
//!     println!("Connected to: {identity}");
//!
//!     instrument
//!         .apply_sweep_params(FrequencyRange::new(2.400e9, 2.420e9, 10e6)?)
//!         .await?;
//!     let result = instrument.auto_tune().await?;
//!     if let Some(best) = result.best {
//!         println!("Tuned to {} ({:.3} dBm)", best.frequency_hz, best.power_dbm);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                   | Purpose                                         |
//! |-------------------------|-------------------------------------------------|
//! | `sweeplib-core`         | Types, events, errors, the [`Transport`] trait  |
//! | `sweeplib-transport`    | TCP transport implementation                    |
//! | `sweeplib-scpi`         | SCPI commands, line framing, [`Session`]        |
//! | `sweeplib-engine`       | Sweep engine, auto-tuner, poller, [`Instrument`]|
//! | `sweeplib-test-harness` | Mock transport and scripted instrument server   |
//! | **`sweeplib`**          | This facade crate -- re-exports everything      |
//!
//! ## The `Instrument` Handle
//!
//! [`Instrument`] spawns a single worker task that owns the connection and
//! serializes every command/reply exchange -- the wire protocol has no
//! request IDs, so only one exchange may ever be in flight. The handle's
//! async methods (`connect`, `apply_sweep_params`, `auto_tune`,
//! `start_polling`, `send_raw`, ...) enqueue work for that task;
//! [`subscribe`](Instrument::subscribe) returns a broadcast receiver of
//! [`SweepEvent`]s for live progress without polling:
//!
//! ```no_run
//! use sweeplib::SweepEvent;
//! # async fn example(instrument: &sweeplib::Instrument) -> sweeplib::Result<()> {
//! let mut events = instrument.subscribe();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         SweepEvent::StepCompleted { sample } => println!("{sample}"),
//!         SweepEvent::SweepFinished { result } => {
//!             println!("pass done, {} samples", result.samples.len());
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Driving the `Session` Directly
//!
//! The worker is a convenience; test harnesses and simple scripts can use
//! [`Session`] and [`SweepEngine`](engine::SweepEngine) directly, with a
//! mock transport from `sweeplib-test-harness` substituting for hardware.

pub use sweeplib_core::*;

pub use sweeplib_engine::{Instrument, InstrumentBuilder};
pub use sweeplib_scpi::Session;

/// Transport implementations (TCP).
pub mod transport {
    pub use sweeplib_transport::*;
}

/// SCPI protocol layer: commands, line framing, session.
pub mod scpi {
    pub use sweeplib_scpi::*;
}

/// Sweep engine, auto-tuner, poller state machine, and the worker.
pub mod engine {
    pub use sweeplib_engine::*;
}
