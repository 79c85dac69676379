//! The instrument session: connect/disconnect state machine and the
//! instrument-level operations the sweep engine is built from.
//!
//! A [`Session`] exclusively owns its transport. Everything above it
//! (sweep engine, auto-tuner, poller) goes through this API and never
//! touches the socket directly, which is what makes the strict
//! one-exchange-at-a-time wire protocol safe to rely on.

use std::time::Duration;

use sweeplib_core::error::{Error, Result};
use sweeplib_core::transport::Transport;
use sweeplib_core::types::SessionState;
use sweeplib_transport::TcpTransport;

use crate::commands;
use crate::line::LineIo;

/// Conventional SCPI-over-TCP port, used when the endpoint omits one.
pub const DEFAULT_PORT: u16 = 5025;

/// Default wait for one reply line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// An instrument session.
///
/// Holds the line-level connection while in the connected state, the
/// identification string from the connect-time `*IDN?` check, and the
/// per-reply read timeout. State transitions happen only through
/// [`connect`](Session::connect) and [`disconnect`](Session::disconnect);
/// there is no automatic reconnect, but connection-fatal errors drop the
/// transport so later calls fail fast with [`Error::NotConnected`]
/// instead of hanging on a dead socket.
pub struct Session {
    io: Option<LineIo>,
    identity: Option<String>,
    read_timeout: Duration,
}

impl Session {
    /// Create a disconnected session with the default read timeout.
    pub fn new() -> Self {
        Self::with_read_timeout(DEFAULT_READ_TIMEOUT)
    }

    /// Create a disconnected session with a custom per-reply timeout.
    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        Session {
            io: None,
            identity: None,
            read_timeout,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        if self.io.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// Whether the session is connected.
    pub fn is_connected(&self) -> bool {
        self.io.is_some()
    }

    /// The `*IDN?` reply captured at connect time, while connected.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Connect to an instrument at `endpoint` and verify it is alive.
    ///
    /// `endpoint` is `host` or `host:port`; a bare host gets the
    /// conventional SCPI port 5025. The session opens the socket, sends
    /// `*IDN?`, and reads one reply line; only if both succeed does the
    /// state become connected. On any failure the partially-opened socket
    /// is closed, the state stays disconnected, and the error is
    /// [`Error::ConnectionFailed`].
    ///
    /// Returns the identification string.
    pub async fn connect(&mut self, endpoint: &str) -> Result<String> {
        if self.io.is_some() {
            return Err(Error::ConnectionFailed {
                cause: "already connected".into(),
            });
        }

        let addr = if endpoint.contains(':') {
            endpoint.to_string()
        } else {
            format!("{endpoint}:{DEFAULT_PORT}")
        };

        let transport = TcpTransport::connect(&addr)
            .await
            .map_err(|e| Error::ConnectionFailed {
                cause: e.to_string(),
            })?;

        self.attach(Box::new(transport)).await
    }

    /// Connect over an already-constructed transport.
    ///
    /// Runs the same `*IDN?` liveness check as [`connect`](Session::connect).
    /// This is how tests attach a mock transport; the protocol path is
    /// identical from here on.
    pub async fn connect_with_transport(
        &mut self,
        transport: Box<dyn Transport>,
    ) -> Result<String> {
        if self.io.is_some() {
            return Err(Error::ConnectionFailed {
                cause: "already connected".into(),
            });
        }
        self.attach(transport).await
    }

    async fn attach(&mut self, transport: Box<dyn Transport>) -> Result<String> {
        let timeout = self.read_timeout;
        let mut io = LineIo::new(transport);

        let check = async {
            io.send_line(commands::IDN_QUERY).await?;
            io.read_line(timeout).await
        };
        let identity = match check.await {
            Ok(identity) => identity,
            Err(e) => {
                let _ = io.close().await;
                return Err(Error::ConnectionFailed {
                    cause: e.to_string(),
                });
            }
        };

        tracing::info!(identity = %identity, "instrument session established");
        self.identity = Some(identity.clone());
        self.io = Some(io);
        Ok(identity)
    }

    /// Close the connection if one is open.
    ///
    /// Idempotent: disconnecting an already-disconnected (or
    /// never-connected) session is a no-op, not an error.
    pub async fn disconnect(&mut self) {
        if let Some(mut io) = self.io.take() {
            let _ = io.close().await;
            tracing::info!("instrument session closed");
        }
        self.identity = None;
    }

    /// Tune the instrument to `hz`. No reply is expected.
    pub async fn set_frequency(&mut self, hz: f64) -> Result<()> {
        self.send(&commands::set_frequency(hz)).await
    }

    /// Move the marker to the trace peak and read its power in dBm.
    ///
    /// A reply that does not parse as a number fails with
    /// [`Error::Parse`], which is recoverable per sweep step; the
    /// connection stays up.
    pub async fn read_peak_power(&mut self) -> Result<f64> {
        self.send(commands::MARKER_TO_PEAK).await?;
        let raw = self.query(commands::MARKER_POWER_QUERY).await?;
        parse_reply(&raw)
    }

    /// Read the marker's frequency position in hertz.
    pub async fn read_marker_frequency_hz(&mut self) -> Result<f64> {
        let raw = self.query(commands::MARKER_FREQUENCY_QUERY).await?;
        parse_reply(&raw)
    }

    /// Send a raw command line.
    ///
    /// Queries (`?`-terminated) return `Some(reply)`; set commands return
    /// `None` without reading.
    pub async fn send_raw(&mut self, command: &str) -> Result<Option<String>> {
        let command = command.trim();
        if commands::is_query(command) {
            Ok(Some(self.query(command).await?))
        } else {
            self.send(command).await?;
            Ok(None)
        }
    }

    /// Send one line, demoting the session on connection-fatal errors.
    async fn send(&mut self, line: &str) -> Result<()> {
        let io = self.io.as_mut().ok_or(Error::NotConnected)?;
        let result = io.send_line(line).await;
        result.map_err(|e| self.note_fatal(e))
    }

    /// Send one line and read one reply, demoting on fatal errors.
    async fn query(&mut self, line: &str) -> Result<String> {
        let timeout = self.read_timeout;
        let io = self.io.as_mut().ok_or(Error::NotConnected)?;
        let result = match io.send_line(line).await {
            Ok(()) => io.read_line(timeout).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.note_fatal(e))
    }

    /// Drop the transport on connection-fatal errors so subsequent calls
    /// fail fast with [`Error::NotConnected`]. The socket closes when the
    /// transport is dropped.
    fn note_fatal(&mut self, e: Error) -> Error {
        if e.is_connection_fatal() {
            tracing::warn!(error = %e, "connection-fatal error, closing session");
            self.io = None;
            self.identity = None;
        }
        e
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an instrument reply as a locale-invariant float.
fn parse_reply(raw: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|_| Error::Parse {
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeplib_core::types::SessionState;
    use sweeplib_test_harness::MockTransport;

    const IDN: &[u8] = b"Acme,SA-2400,0042,1.03\n";

    /// Helper: a connected session over a mock that already served `*IDN?`
    /// and holds `extra` further expectations.
    async fn connected_session(load: impl FnOnce(&mut MockTransport)) -> Session {
        let mut mock = MockTransport::new();
        mock.expect(b"*IDN?\n", IDN);
        load(&mut mock);

        let mut session = Session::new();
        session
            .connect_with_transport(Box::new(mock))
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn connect_runs_liveness_check() {
        let session = connected_session(|_| {}).await;
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.identity(), Some("Acme,SA-2400,0042,1.03"));
    }

    #[tokio::test]
    async fn connect_fails_when_idn_times_out() {
        // The socket connects but the identification read times out:
        // the session must report ConnectionFailed and stay disconnected.
        let mut mock = MockTransport::new();
        mock.expect(b"*IDN?\n", b"");

        let mut session = Session::new();
        let result = session.connect_with_transport(Box::new(mock)).await;
        assert!(matches!(result, Err(Error::ConnectionFailed { .. })));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn connect_twice_is_rejected() {
        let mut session = connected_session(|_| {}).await;

        let mut second = MockTransport::new();
        second.expect(b"*IDN?\n", IDN);
        let result = session.connect_with_transport(Box::new(second)).await;
        assert!(matches!(result, Err(Error::ConnectionFailed { .. })));
        // The original connection is untouched.
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut session = Session::new();

        // Never connected: a no-op.
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);

        let mut session = connected_session(|_| {}).await;
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn operations_while_disconnected_fail_fast() {
        let mut session = Session::new();
        assert!(matches!(
            session.set_frequency(1.0e9).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            session.read_peak_power().await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            session.read_marker_frequency_hz().await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            session.send_raw("*IDN?").await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn set_frequency_formats_hertz_invariantly() {
        let mut session = connected_session(|mock| {
            mock.expect(b":FREQ 2400000000\n", b"");
        })
        .await;

        session.set_frequency(2.4e9).await.unwrap();
    }

    #[tokio::test]
    async fn read_peak_power_moves_marker_then_queries() {
        let mut session = connected_session(|mock| {
            mock.expect(b":CALC:MARK1:MAX\n", b"");
            mock.expect(b":CALC:MARK1:Y?\n", b"-38.5\n");
        })
        .await;

        let power = session.read_peak_power().await.unwrap();
        assert_eq!(power, -38.5);
    }

    #[tokio::test]
    async fn read_marker_frequency() {
        let mut session = connected_session(|mock| {
            mock.expect(b":CALC:MARK1:X?\n", b"2410000000\n");
        })
        .await;

        let hz = session.read_marker_frequency_hz().await.unwrap();
        assert_eq!(hz, 2.41e9);
    }

    #[tokio::test]
    async fn garbled_reply_is_parse_error_and_recoverable() {
        let mut session = connected_session(|mock| {
            mock.expect(b":CALC:MARK1:MAX\n", b"");
            mock.expect(b":CALC:MARK1:Y?\n", b"ERR\n");
            mock.expect(b":CALC:MARK1:MAX\n", b"");
            mock.expect(b":CALC:MARK1:Y?\n", b"-40.1\n");
        })
        .await;

        let result = session.read_peak_power().await;
        match result {
            Err(Error::Parse { raw }) => assert_eq!(raw, "ERR"),
            other => panic!("expected Parse error, got {:?}", other),
        }

        // Parse failures do not tear down the connection.
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.read_peak_power().await.unwrap(), -40.1);
    }

    #[tokio::test]
    async fn reply_timeout_demotes_session() {
        let mut session = connected_session(|mock| {
            mock.expect(b":CALC:MARK1:X?\n", b"");
        })
        .await;

        let result = session.read_marker_frequency_hz().await;
        assert!(matches!(result, Err(Error::Timeout)));

        // The session dropped the dead transport; later calls fail fast.
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.read_marker_frequency_hz().await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn send_raw_query_returns_reply() {
        let mut session = connected_session(|mock| {
            mock.expect(b"*IDN?\n", IDN);
        })
        .await;

        let reply = session.send_raw("*IDN?").await.unwrap();
        assert_eq!(reply.as_deref(), Some("Acme,SA-2400,0042,1.03"));
    }

    #[tokio::test]
    async fn send_raw_set_command_expects_no_reply() {
        let mut session = connected_session(|mock| {
            mock.expect(b":FREQ 1000\n", b"");
        })
        .await;

        let reply = session.send_raw(" :FREQ 1000 ").await.unwrap();
        assert_eq!(reply, None);
    }
}
