//! The instrument worker task and its public handle.
//!
//! One tokio task owns the [`Session`] exclusively and processes all
//! command/reply exchanges: manual commands arrive on an mpsc channel,
//! periodic sweep cycles run from an interval timer, and both are arms of
//! a single `select!` loop, so no two logical operations can ever
//! interleave mid-exchange on the wire. The [`Instrument`] handle is the
//! public face: request/reply methods plus a broadcast event stream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sweeplib_core::error::{Error, Result};
use sweeplib_core::events::SweepEvent;
use sweeplib_core::types::{FrequencyRange, PollerState, SessionState, SweepResult};
use sweeplib_scpi::Session;

use crate::poller::Poller;
use crate::sweep::{SweepConfig, SweepEngine, DEFAULT_SETTLE_DELAY};
use crate::tuner::AutoTuner;

/// Default cadence for periodic sweep cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default capacity of the broadcast event channel.
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Capacity of the command channel from handle to worker.
const COMMAND_CAPACITY: usize = 32;

/// A request sent from handle methods to the worker task.
enum Request {
    Connect {
        endpoint: String,
        reply: oneshot::Sender<Result<String>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    SendRaw {
        command: String,
        reply: oneshot::Sender<Result<Option<String>>>,
    },
    ApplySweepParams {
        range: FrequencyRange,
        reply: oneshot::Sender<()>,
    },
    AutoTune {
        reply: oneshot::Sender<Result<SweepResult>>,
    },
    StartPolling {
        reply: oneshot::Sender<()>,
    },
    StopPolling {
        reply: oneshot::Sender<()>,
    },
    ClearHistory {
        reply: oneshot::Sender<()>,
    },
    Query {
        reply: oneshot::Sender<Snapshot>,
    },
}

/// A point-in-time view of the worker's state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Connection state of the session.
    pub session: SessionState,
    /// The `*IDN?` string, while connected.
    pub identity: Option<String>,
    /// Poller state.
    pub poller: PollerState,
    /// The sweep parameters currently applied, if any.
    pub range: Option<FrequencyRange>,
    /// The most recent sweep result, until cleared.
    pub last_result: Option<SweepResult>,
}

/// Fluent builder for [`Instrument`].
///
/// All timing knobs have the production defaults; tests shrink them to
/// keep suites fast.
///
/// ```no_run
/// use std::time::Duration;
/// use sweeplib_engine::Instrument;
///
/// # async fn example() -> sweeplib_core::Result<()> {
/// let instrument = Instrument::builder()
///     .poll_interval(Duration::from_millis(500))
///     .spawn();
/// instrument.connect("10.0.0.5:5025").await?;
/// # Ok(())
/// # }
/// ```
pub struct InstrumentBuilder {
    poll_interval: Duration,
    settle_delay: Duration,
    read_timeout: Duration,
    event_capacity: usize,
}

impl InstrumentBuilder {
    /// Builder with production defaults: 1 s poll interval, 200 ms settle
    /// delay, 1 s read timeout.
    pub fn new() -> Self {
        InstrumentBuilder {
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            read_timeout: sweeplib_scpi::session::DEFAULT_READ_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set the cadence of periodic sweep cycles.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the per-step settle delay between tuning and reading.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the timeout for one reply line.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the broadcast event channel capacity.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Spawn the worker task and return its handle.
    pub fn spawn(self) -> Instrument {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(self.event_capacity);
        let cancel = CancellationToken::new();
        let interrupt = Arc::new(Mutex::new(CancellationToken::new()));

        let config = SweepConfig {
            settle_delay: self.settle_delay,
        };
        let worker = Worker {
            session: Session::with_read_timeout(self.read_timeout),
            engine: SweepEngine::new(config),
            tuner: AutoTuner::new(config),
            poller: Poller::new(),
            range: None,
            last_result: None,
            announced_connected: false,
            events: events.clone(),
            interrupt: Arc::clone(&interrupt),
            poll_interval: self.poll_interval,
            cancel: cancel.clone(),
        };

        let task = tokio::spawn(worker.run(cmd_rx));

        Instrument {
            cmd_tx,
            events,
            cancel,
            interrupt,
            task,
        }
    }
}

impl Default for InstrumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the instrument worker task.
///
/// Methods enqueue a command and await its reply; the worker processes
/// commands strictly one at a time, interleaved with poll cycles, which
/// is what guarantees the single-outstanding-exchange invariant.
/// [`disconnect`](Instrument::disconnect) and
/// [`stop_polling`](Instrument::stop_polling) additionally interrupt an
/// in-flight sweep pass at its next step boundary, so their worst-case
/// latency is one settle delay plus one read timeout.
pub struct Instrument {
    cmd_tx: mpsc::Sender<Request>,
    events: broadcast::Sender<SweepEvent>,
    cancel: CancellationToken,
    /// The interrupt token of the current (or next) sweep pass.
    interrupt: Arc<Mutex<CancellationToken>>,
    task: JoinHandle<()>,
}

impl Instrument {
    /// Start building an instrument worker.
    pub fn builder() -> InstrumentBuilder {
        InstrumentBuilder::new()
    }

    /// Subscribe to sweep events.
    ///
    /// The channel is bounded; a consumer that falls behind misses older
    /// events (lagged) rather than stalling the worker.
    pub fn subscribe(&self) -> broadcast::Receiver<SweepEvent> {
        self.events.subscribe()
    }

    /// Connect to the instrument at `endpoint` (`host` or `host:port`,
    /// default port 5025) and return its identification string.
    pub async fn connect(&self, endpoint: &str) -> Result<String> {
        let endpoint = endpoint.to_string();
        self.request(|reply| Request::Connect { endpoint, reply })
            .await?
    }

    /// Close the connection. Idempotent; interrupts an in-flight sweep
    /// pass at its next step boundary.
    pub async fn disconnect(&self) -> Result<()> {
        self.interrupt_pass();
        self.request(|reply| Request::Disconnect { reply }).await
    }

    /// Send a raw command line. Queries (`?`-terminated) return
    /// `Some(reply)`. The poller is suspended around the exchange.
    pub async fn send_raw(&self, command: &str) -> Result<Option<String>> {
        let command = command.to_string();
        self.request(|reply| Request::SendRaw { command, reply })
            .await?
    }

    /// Apply sweep parameters for subsequent poll cycles and auto-tunes.
    ///
    /// Range validation happens when the [`FrequencyRange`] is
    /// constructed, before anything reaches the worker.
    pub async fn apply_sweep_params(&self, range: FrequencyRange) -> Result<()> {
        self.request(|reply| Request::ApplySweepParams { range, reply })
            .await
    }

    /// Run an auto-tune pass with the applied parameters: sweep, then
    /// leave the instrument tuned to the strongest frequency found.
    ///
    /// The poller is suspended for the duration and resumed afterwards if
    /// it was running.
    pub async fn auto_tune(&self) -> Result<SweepResult> {
        self.request(|reply| Request::AutoTune { reply }).await?
    }

    /// Start periodic sweep cycles.
    pub async fn start_polling(&self) -> Result<()> {
        self.request(|reply| Request::StartPolling { reply }).await
    }

    /// Stop periodic sweep cycles; interrupts an in-flight pass at its
    /// next step boundary. Only an explicit stop halts the poller --
    /// cycle errors never do.
    pub async fn stop_polling(&self) -> Result<()> {
        self.interrupt_pass();
        self.request(|reply| Request::StopPolling { reply }).await
    }

    /// Drop the retained last sweep result.
    pub async fn clear_history(&self) -> Result<()> {
        self.request(|reply| Request::ClearHistory { reply }).await
    }

    /// A point-in-time view of session, poller, parameters, and the last
    /// result.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.request(|reply| Request::Query { reply }).await
    }

    /// Current poller state.
    pub async fn poller_state(&self) -> Result<PollerState> {
        Ok(self.snapshot().await?.poller)
    }

    /// Current session state.
    pub async fn session_state(&self) -> Result<SessionState> {
        Ok(self.snapshot().await?.session)
    }

    /// Stop the worker task, disconnecting the session.
    ///
    /// An in-flight sweep pass is interrupted at its next step boundary.
    pub async fn shutdown(self) {
        self.interrupt_pass();
        self.cancel.cancel();
        let _ = self.task.await;
    }

    /// Cancel the current sweep pass's interrupt token.
    fn interrupt_pass(&self) {
        if let Ok(token) = self.interrupt.lock() {
            token.cancel();
        }
    }

    /// Enqueue a request and await its reply.
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// The worker-task state. Owns the session; nothing else touches it.
struct Worker {
    session: Session,
    engine: SweepEngine,
    tuner: AutoTuner,
    poller: Poller,
    /// Sweep parameters; cycles and auto-tunes are no-ops/errors until set.
    range: Option<FrequencyRange>,
    last_result: Option<SweepResult>,
    /// Whether subscribers have been told we are connected, so a demotion
    /// inside the session surfaces as exactly one Disconnected event.
    announced_connected: bool,
    events: broadcast::Sender<SweepEvent>,
    interrupt: Arc<Mutex<CancellationToken>>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl Worker {
    /// The main worker loop. Runs as a spawned tokio task.
    ///
    /// Uses `tokio::select! { biased; }` to prioritize:
    /// 1. Cancellation
    /// 2. Command dispatch
    /// 3. Poll-interval ticks
    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("instrument worker cancelled");
                    break;
                }

                req = rx.recv() => {
                    match req {
                        Some(req) => self.handle_request(req).await,
                        None => {
                            debug!("command channel closed, exiting worker");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.poll_cycle().await;
                    // A cycle spans many settle delays; restart the
                    // interval so the next cycle begins a full period
                    // after this one finished, never overlapping it.
                    ticker.reset();
                }
            }
        }

        self.session.disconnect().await;
    }

    /// Dispatch a single request.
    async fn handle_request(&mut self, req: Request) {
        match req {
            Request::Connect { endpoint, reply } => {
                let result = self.session.connect(&endpoint).await;
                match &result {
                    Ok(identity) => {
                        self.announced_connected = true;
                        let _ = self.events.send(SweepEvent::Connected {
                            identity: identity.clone(),
                        });
                    }
                    Err(e) => self.status(format!("connect failed: {e}")),
                }
                let _ = reply.send(result);
            }

            Request::Disconnect { reply } => {
                self.session.disconnect().await;
                self.sync_connection_state();
                let _ = reply.send(());
            }

            Request::SendRaw { command, reply } => {
                let suspended = self.poller.suspend();
                if suspended {
                    self.emit_poller();
                }

                let result = self.session.send_raw(&command).await;

                if suspended && self.poller.resume() {
                    self.emit_poller();
                }
                self.sync_connection_state();
                let _ = reply.send(result);
            }

            Request::ApplySweepParams { range, reply } => {
                debug!(%range, "sweep parameters applied");
                self.range = Some(range);
                let _ = reply.send(());
            }

            Request::AutoTune { reply } => {
                let suspended = self.poller.suspend();
                if suspended {
                    self.emit_poller();
                }

                let result = match self.range {
                    Some(range) => {
                        let pass = self.fresh_interrupt();
                        self.tuner
                            .run(&mut self.session, &range, &self.events, &pass)
                            .await
                    }
                    // Parameters were never applied; the implied all-zero
                    // range is as invalid as any other.
                    None => Err(Error::InvalidRange {
                        start_hz: 0.0,
                        stop_hz: 0.0,
                        step_hz: 0.0,
                    }),
                };

                match &result {
                    Ok(result) => {
                        let _ = self.events.send(SweepEvent::SweepFinished {
                            result: result.clone(),
                        });
                        self.last_result = Some(result.clone());
                    }
                    Err(e) => self.status(format!("auto-tune failed: {e}")),
                }

                if suspended && self.poller.resume() {
                    self.emit_poller();
                }
                self.sync_connection_state();
                let _ = reply.send(result);
            }

            Request::StartPolling { reply } => {
                if self.poller.start() {
                    self.emit_poller();
                }
                let _ = reply.send(());
            }

            Request::StopPolling { reply } => {
                if self.poller.stop() {
                    self.emit_poller();
                }
                let _ = reply.send(());
            }

            Request::ClearHistory { reply } => {
                self.last_result = None;
                let _ = reply.send(());
            }

            Request::Query { reply } => {
                let _ = reply.send(Snapshot {
                    session: self.session.state(),
                    identity: self.session.identity().map(str::to_string),
                    poller: self.poller.state(),
                    range: self.range,
                    last_result: self.last_result.clone(),
                });
            }
        }
    }

    /// One poll cycle: sweep, then query the marker frequency.
    ///
    /// Runs only while the poller is running; a tick while disconnected
    /// skips the cycle silently. Errors become status events and never
    /// stop the poller.
    async fn poll_cycle(&mut self) {
        if !self.poller.is_running() {
            return;
        }
        if !self.session.is_connected() {
            return;
        }
        let Some(range) = self.range else {
            tracing::trace!("no sweep parameters applied, skipping cycle");
            return;
        };

        let pass = self.fresh_interrupt();
        match self
            .engine
            .run(&mut self.session, &range, &self.events, &pass)
            .await
        {
            Ok(result) => {
                // The cycle's sweep result goes out before its marker
                // frequency update.
                let _ = self.events.send(SweepEvent::SweepFinished {
                    result: result.clone(),
                });
                self.last_result = Some(result);

                match self.session.read_marker_frequency_hz().await {
                    Ok(frequency_hz) => {
                        let _ = self
                            .events
                            .send(SweepEvent::MarkerFrequency { frequency_hz });
                    }
                    Err(e) => self.status(format!("marker frequency query failed: {e}")),
                }
            }
            Err(e) => self.status(format!("sweep cycle failed: {e}")),
        }
        self.sync_connection_state();
    }

    /// Install a fresh interrupt token for the next sweep pass.
    ///
    /// The token is a child of the worker's cancellation token, so
    /// shutdown also interrupts an in-flight pass.
    fn fresh_interrupt(&self) -> CancellationToken {
        let token = self.cancel.child_token();
        if let Ok(mut slot) = self.interrupt.lock() {
            *slot = token.clone();
        }
        token
    }

    /// Emit a Disconnected event when a session demotion is observed.
    fn sync_connection_state(&mut self) {
        let connected = self.session.is_connected();
        if self.announced_connected && !connected {
            let _ = self.events.send(SweepEvent::Disconnected);
        }
        self.announced_connected = connected;
    }

    fn emit_poller(&self) {
        let _ = self.events.send(SweepEvent::PollerChanged {
            state: self.poller.state(),
        });
    }

    fn status(&self, message: String) {
        debug!(message = %message, "status");
        let _ = self.events.send(SweepEvent::Status { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeplib_test_harness::MockInstrument;
    use tokio::net::TcpListener;

    const IDN: &str = "Acme,SA-2400,0042,1.03";

    fn test_range() -> FrequencyRange {
        FrequencyRange::new(2.400e9, 2.420e9, 10e6).unwrap()
    }

    /// Script the exchanges of one sweep pass on the mock server.
    fn expect_pass(server: &mut MockInstrument, replies: &[(&str, &str)]) {
        for &(freq, reply) in replies {
            server.expect(&format!(":FREQ {freq}"), None);
            server.expect(":CALC:MARK1:MAX", None);
            server.expect(":CALC:MARK1:Y?", Some(reply));
        }
    }

    /// Receive events until `pred` matches, with a deadline.
    async fn recv_until(
        rx: &mut broadcast::Receiver<SweepEvent>,
        mut pred: impl FnMut(&SweepEvent) -> bool,
    ) -> SweepEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn state_commands_work_while_disconnected() {
        let instrument = Instrument::builder().spawn();

        let snap = instrument.snapshot().await.unwrap();
        assert_eq!(snap.session, SessionState::Disconnected);
        assert_eq!(snap.poller, PollerState::Stopped);
        assert!(snap.range.is_none());
        assert!(snap.last_result.is_none());

        instrument.apply_sweep_params(test_range()).await.unwrap();
        instrument.start_polling().await.unwrap();

        let snap = instrument.snapshot().await.unwrap();
        assert_eq!(snap.poller, PollerState::Running);
        assert_eq!(snap.range, Some(test_range()));
        // Still disconnected: ticks skip their cycles, no errors.
        assert_eq!(snap.session, SessionState::Disconnected);

        instrument.stop_polling().await.unwrap();
        assert_eq!(
            instrument.poller_state().await.unwrap(),
            PollerState::Stopped
        );

        instrument.clear_history().await.unwrap();
        instrument.shutdown().await;
    }

    #[tokio::test]
    async fn auto_tune_without_params_is_invalid_range() {
        let instrument = Instrument::builder().spawn();
        let result = instrument.auto_tune().await;
        assert!(matches!(result, Err(Error::InvalidRange { .. })));
        instrument.shutdown().await;
    }

    #[tokio::test]
    async fn connect_failure_leaves_session_disconnected() {
        // Bind then drop a listener so the port refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let instrument = Instrument::builder().spawn();
        let result = instrument.connect(&addr).await;
        assert!(matches!(result, Err(Error::ConnectionFailed { .. })));
        assert_eq!(
            instrument.session_state().await.unwrap(),
            SessionState::Disconnected
        );
        instrument.shutdown().await;
    }

    #[tokio::test]
    async fn poll_cycle_sweeps_then_reports_marker_frequency() {
        let mut server = MockInstrument::bind().await.unwrap();
        server.expect("*IDN?", Some(IDN));
        expect_pass(
            &mut server,
            &[
                ("2400000000", "-42.0"),
                ("2410000000", "-38.5"),
                ("2420000000", "-40.1"),
            ],
        );
        server.expect(":CALC:MARK1:X?", Some("2410000000"));
        let addr = server.addr().to_string();
        server.start();

        let instrument = Instrument::builder()
            .poll_interval(Duration::from_millis(1000))
            .settle_delay(Duration::from_millis(1))
            .spawn();
        let mut events = instrument.subscribe();

        let identity = instrument.connect(&addr).await.unwrap();
        assert_eq!(identity, IDN);
        instrument.apply_sweep_params(test_range()).await.unwrap();
        instrument.start_polling().await.unwrap();

        // The cycle's sweep result is delivered before its marker update.
        let mut finished: Option<SweepResult> = None;
        let marker = loop {
            match recv_until(&mut events, |e| {
                matches!(
                    e,
                    SweepEvent::SweepFinished { .. } | SweepEvent::MarkerFrequency { .. }
                )
            })
            .await
            {
                SweepEvent::SweepFinished { result } => finished = Some(result),
                SweepEvent::MarkerFrequency { frequency_hz } => break frequency_hz,
                _ => unreachable!(),
            }
        };

        let result = finished.expect("sweep result must precede the marker update");
        assert_eq!(result.samples.len(), 3);
        assert_eq!(result.samples[0].frequency_hz, 2.400e9);
        assert_eq!(result.samples[1].power_dbm, -38.5);
        assert_eq!(marker, 2.410e9);

        instrument.stop_polling().await.unwrap();
        instrument.disconnect().await.unwrap();
        instrument.shutdown().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn auto_tune_suspends_and_resumes_the_poller() {
        let mut server = MockInstrument::bind().await.unwrap();
        server.expect("*IDN?", Some(IDN));
        expect_pass(
            &mut server,
            &[
                ("2400000000", "-42.0"),
                ("2410000000", "-38.5"),
                ("2420000000", "-40.1"),
            ],
        );
        server.expect(":FREQ 2410000000", None);
        let addr = server.addr().to_string();
        server.start();

        // A poll interval far beyond the test's lifetime: the poller is
        // Running but no cycle fires, so the script stays deterministic.
        let instrument = Instrument::builder()
            .poll_interval(Duration::from_secs(600))
            .settle_delay(Duration::from_millis(1))
            .spawn();
        let mut events = instrument.subscribe();

        instrument.connect(&addr).await.unwrap();
        instrument.apply_sweep_params(test_range()).await.unwrap();
        instrument.start_polling().await.unwrap();

        let result = instrument.auto_tune().await.unwrap();
        let best = result.best.unwrap();
        assert_eq!(best.frequency_hz, 2.410e9);
        assert_eq!(best.power_dbm, -38.5);

        // Events: poller suspended before the pass, running again after.
        match recv_until(&mut events, |e| matches!(e, SweepEvent::PollerChanged { .. })).await {
            SweepEvent::PollerChanged { state } => assert_eq!(state, PollerState::Suspended),
            _ => unreachable!(),
        }
        match recv_until(&mut events, |e| matches!(e, SweepEvent::PollerChanged { .. })).await {
            SweepEvent::PollerChanged { state } => assert_eq!(state, PollerState::Running),
            _ => unreachable!(),
        }
        assert_eq!(
            instrument.poller_state().await.unwrap(),
            PollerState::Running
        );

        instrument.stop_polling().await.unwrap();
        instrument.disconnect().await.unwrap();
        instrument.shutdown().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn send_raw_routes_through_the_worker() {
        let mut server = MockInstrument::bind().await.unwrap();
        server.expect("*IDN?", Some(IDN));
        server.expect(":FREQ 1000", None);
        server.expect("*IDN?", Some(IDN));
        let addr = server.addr().to_string();
        server.start();

        let instrument = Instrument::builder()
            .poll_interval(Duration::from_secs(600))
            .spawn();

        instrument.connect(&addr).await.unwrap();
        assert_eq!(instrument.send_raw(":FREQ 1000").await.unwrap(), None);
        assert_eq!(
            instrument.send_raw("*IDN?").await.unwrap().as_deref(),
            Some(IDN)
        );

        instrument.disconnect().await.unwrap();
        instrument.shutdown().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_auto_tunes_serialize() {
        // Two auto-tunes issued at once must queue, never interleave
        // mid-exchange: the server script is strictly sequential and a
        // single out-of-order command would fail it.
        let mut server = MockInstrument::bind().await.unwrap();
        server.expect("*IDN?", Some(IDN));
        expect_pass(
            &mut server,
            &[
                ("2400000000", "-42.0"),
                ("2410000000", "-38.5"),
                ("2420000000", "-40.1"),
            ],
        );
        server.expect(":FREQ 2410000000", None);
        expect_pass(
            &mut server,
            &[
                ("2400000000", "-42.0"),
                ("2410000000", "-38.5"),
                ("2420000000", "-35.0"),
            ],
        );
        server.expect(":FREQ 2420000000", None);
        let addr = server.addr().to_string();
        server.start();

        let instrument = Instrument::builder()
            .poll_interval(Duration::from_secs(600))
            .settle_delay(Duration::from_millis(1))
            .spawn();

        instrument.connect(&addr).await.unwrap();
        instrument.apply_sweep_params(test_range()).await.unwrap();

        let (first, second) = tokio::join!(instrument.auto_tune(), instrument.auto_tune());
        assert_eq!(first.unwrap().best.unwrap().frequency_hz, 2.410e9);
        assert_eq!(second.unwrap().best.unwrap().frequency_hz, 2.420e9);

        instrument.disconnect().await.unwrap();
        instrument.shutdown().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn stop_polling_interrupts_an_inflight_pass() {
        // Script far more steps than the pass should complete; the stop
        // must land within one step boundary.
        let mut server = MockInstrument::bind().await.unwrap();
        server.expect("*IDN?", Some(IDN));
        let range = FrequencyRange::new(1.0e9, 1.049e9, 1e6).unwrap();
        assert_eq!(range.step_count(), 50);
        let freqs: Vec<String> = range.frequencies().map(|f| f.to_string()).collect();
        let pairs: Vec<(&str, &str)> = freqs.iter().map(|f| (f.as_str(), "-50.0")).collect();
        expect_pass(&mut server, &pairs);
        let addr = server.addr().to_string();
        server.start();

        let instrument = Instrument::builder()
            .poll_interval(Duration::from_millis(50))
            .settle_delay(Duration::from_millis(10))
            .spawn();
        let mut events = instrument.subscribe();

        instrument.connect(&addr).await.unwrap();
        instrument.apply_sweep_params(range).await.unwrap();
        instrument.start_polling().await.unwrap();

        // Wait until the pass is demonstrably under way, then stop.
        recv_until(&mut events, |e| matches!(e, SweepEvent::StepCompleted { .. })).await;
        instrument.stop_polling().await.unwrap();

        match recv_until(&mut events, |e| matches!(e, SweepEvent::SweepFinished { .. })).await {
            SweepEvent::SweepFinished { result } => {
                assert!(
                    !result.samples.is_empty() && result.samples.len() < 50,
                    "expected a partial pass, got {} samples",
                    result.samples.len()
                );
            }
            _ => unreachable!(),
        }
        assert_eq!(
            instrument.poller_state().await.unwrap(),
            PollerState::Stopped
        );

        instrument.shutdown().await;
        // The server script is deliberately longer than the interrupted
        // pass consumed; no wait() here.
    }
}
