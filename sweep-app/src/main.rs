// sweeplib test application -- CLI tool for exercising the sweep/tune
// engine against a real instrument (or the mock server from
// sweeplib-test-harness, bound by a test script).
//
// Usage:
//   sweep-app --host 10.0.0.5 idn
//   sweep-app --host 10.0.0.5 raw ":CALC:MARK1:X?"
//   sweep-app --host 10.0.0.5 sweep --start 2400 --stop 2420 --step 1
//   sweep-app --host 10.0.0.5 tune --start 2400 --stop 2420 --step 1 --unit MHz
//   sweep-app --host 10.0.0.5 watch --start 2400 --stop 2420 --step 5 --duration-secs 30
//
// Frequencies are given in --unit (default MHz). RUST_LOG controls
// tracing output (e.g. RUST_LOG=sweeplib_scpi=debug).

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sweeplib::engine::{SweepConfig, SweepEngine};
use sweeplib::{
    format_frequency, FrequencyRange, FrequencyUnit, Instrument, Session, SweepEvent,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// sweeplib test application -- drives an instrument from the command line.
#[derive(Parser)]
#[command(name = "sweep-app", version, about)]
struct Cli {
    /// Instrument address: host or host:port (default port 5025).
    #[arg(long)]
    host: String,

    /// Timeout for one reply line, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    read_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, print the instrument's identification string, disconnect.
    Idn,

    /// Send a raw SCPI line; queries print their reply.
    Raw {
        /// The command line (quote it: ":CALC:MARK1:X?").
        command: String,
    },

    /// Run one sweep and print a table of peak-power readings.
    Sweep {
        #[command(flatten)]
        range: RangeArgs,

        /// Settle delay after tuning, in milliseconds.
        #[arg(long, default_value_t = 200)]
        settle_ms: u64,
    },

    /// Sweep, then leave the instrument tuned to the strongest frequency.
    Tune {
        #[command(flatten)]
        range: RangeArgs,

        /// Settle delay after tuning, in milliseconds.
        #[arg(long, default_value_t = 200)]
        settle_ms: u64,
    },

    /// Start the periodic poller and stream its events.
    Watch {
        #[command(flatten)]
        range: RangeArgs,

        /// Poll interval, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,

        /// How long to watch before stopping.
        #[arg(long, default_value_t = 30)]
        duration_secs: u64,
    },
}

/// Sweep range arguments, in the chosen unit.
#[derive(clap::Args)]
struct RangeArgs {
    /// Start frequency.
    #[arg(long)]
    start: f64,

    /// Stop frequency.
    #[arg(long)]
    stop: f64,

    /// Step size.
    #[arg(long)]
    step: f64,

    /// Frequency unit: Hz, kHz, MHz, or GHz. Unrecognized labels fall
    /// back to MHz.
    #[arg(long, default_value = "MHz")]
    unit: String,
}

impl RangeArgs {
    fn to_range(&self) -> Result<FrequencyRange> {
        let unit = FrequencyUnit::from_label(&self.unit);
        FrequencyRange::from_unit(self.start, self.stop, self.step, unit)
            .context("invalid sweep range")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let read_timeout = Duration::from_millis(cli.read_timeout_ms);

    match cli.command {
        Command::Idn => {
            let mut session = Session::with_read_timeout(read_timeout);
            let identity = session.connect(&cli.host).await?;
            println!("{identity}");
            session.disconnect().await;
        }

        Command::Raw { command } => {
            let mut session = Session::with_read_timeout(read_timeout);
            session.connect(&cli.host).await?;
            match session.send_raw(&command).await? {
                Some(reply) => println!("{reply}"),
                None => println!("Command sent."),
            }
            session.disconnect().await;
        }

        Command::Sweep { range, settle_ms } => {
            run_sweep(&cli.host, read_timeout, range.to_range()?, settle_ms).await?;
        }

        Command::Tune { range, settle_ms } => {
            run_tune(&cli.host, read_timeout, range.to_range()?, settle_ms).await?;
        }

        Command::Watch {
            range,
            interval_ms,
            duration_secs,
        } => {
            run_watch(
                &cli.host,
                read_timeout,
                range.to_range()?,
                Duration::from_millis(interval_ms),
                Duration::from_secs(duration_secs),
            )
            .await?;
        }
    }

    Ok(())
}

/// One sweep pass, printed as a table with a bar graph.
async fn run_sweep(
    host: &str,
    read_timeout: Duration,
    range: FrequencyRange,
    settle_ms: u64,
) -> Result<()> {
    let mut session = Session::with_read_timeout(read_timeout);
    let identity = session.connect(host).await?;
    println!("Connected: {identity}\n");

    println!(
        "Sweeping {} - {} in {} steps ({} points)...\n",
        format_frequency(range.start_hz()),
        format_frequency(range.stop_hz()),
        format_frequency(range.step_hz()),
        range.step_count()
    );
    println!("{:<14} {:>10}", "Frequency", "Peak");
    println!("{:-<14} {:-<10}", "", "");

    let engine = SweepEngine::new(SweepConfig {
        settle_delay: Duration::from_millis(settle_ms),
    });
    let (events, _) = broadcast::channel(64);
    let result = engine
        .run(&mut session, &range, &events, &CancellationToken::new())
        .await?;

    for sample in &result.samples {
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

/// Auto-tune with live progress output.
async fn run_tune(
    host: &str,
    read_timeout: Duration,
    range: FrequencyRange,
    settle_ms: u64,
) -> Result<()> {
    let instrument = Instrument::builder()
        .read_timeout(read_timeout)
        .settle_delay(Duration::from_millis(settle_ms))
        .spawn();
    let mut events = instrument.subscribe();

    let identity = instrument.connect(host).await?;
    println!("Connected: {identity}\n");

    instrument.apply_sweep_params(range).await?;

    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SweepEvent::StepCompleted { sample } => {
                    println!(
                        "  {} {:+.3} dBm",
                        format_frequency(sample.frequency_hz),
                        sample.power_dbm
                    );
                }
                SweepEvent::StepSkipped { frequency_hz, raw } => {
                    println!(
                        "  {} invalid reply {:?}",
                        format_frequency(frequency_hz),
                        raw
                    );
                }
                SweepEvent::SweepFinished { .. } => break,
                _ => {}
            }
        }
    });

    let result = instrument.auto_tune().await?;
    let _ = progress.await;

    if let Some(best) = result.best {
        println!(
            "\nAuto-tune complete: {} at {:+.3} dBm",
            format_frequency(best.frequency_hz),
            best.power_dbm
        );
    }

    instrument.disconnect().await?;
    instrument.shutdown().await;
    Ok(())
}

/// Periodic polling, streamed to stdout until the duration elapses.
async fn run_watch(
    host: &str,
    read_timeout: Duration,
    range: FrequencyRange,
    interval: Duration,
    duration: Duration,
) -> Result<()> {
    let instrument = Instrument::builder()
        .read_timeout(read_timeout)
        .poll_interval(interval)
        .spawn();
    let mut events = instrument.subscribe();

    let identity = instrument.connect(host).await?;
    println!("Connected: {identity}");

    instrument.apply_sweep_params(range).await?;
    instrument.start_polling().await?;

    let deadline = tokio::time::Instant::now() + duration;
    loop {
        let event = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            event = events.recv() => match event {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        match event {
            SweepEvent::SweepFinished { result } => {
                println!("sweep: {} samples", result.samples.len());
            }
            SweepEvent::MarkerFrequency { frequency_hz } => {
                println!("marker: {}", format_frequency(frequency_hz));
            }
            SweepEvent::Status { message } => println!("status: {message}"),
            SweepEvent::Disconnected => println!("disconnected"),
            _ => {}
        }
    }

    instrument.stop_polling().await?;
    instrument.disconnect().await?;
    instrument.shutdown().await;
    Ok(())
}
