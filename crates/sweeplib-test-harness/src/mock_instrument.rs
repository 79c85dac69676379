//! Scripted SCPI instrument server for end-to-end testing.
//!
//! [`MockInstrument`] is a TCP listener on a random localhost port,
//! pre-loaded with command/reply expectations, enabling deterministic
//! testing of the full stack (TCP transport, line framing, session, sweep
//! engine) without real hardware.
//!
//! # Example
//!
//! ```
//! use sweeplib_test_harness::MockInstrument;
//!
//! # async fn example() -> sweeplib_core::Result<()> {
//! let mut server = MockInstrument::bind().await?;
//!
//! // When the client sends "*IDN?", reply with an identity line.
//! server.expect("*IDN?", Some("Acme,SA-2400,0042,1.03"));
//! // ":FREQ ..." elicits no reply.
//! server.expect(":FREQ 2400000000", None);
//!
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpTransport to `addr` and drive it ...
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use sweeplib_core::error::{Error, Result};

/// A scripted command/reply pair for the mock instrument.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact command line (without terminator) expected from the client.
    command: String,
    /// The reply line to send back, if the command is a query.
    reply: Option<String>,
}

/// A scripted SCPI server for testing over real TCP.
///
/// The server listens on a random localhost port. Once
/// [`start`](MockInstrument::start) is called, it accepts a single
/// connection and processes expectations in order: for each expected
/// command line it reads one `\n`-terminated line from the client,
/// verifies it matches, and writes back the scripted reply (if any).
///
/// After the last expectation the server keeps the connection open and
/// reads until the client closes it, failing if any further command
/// arrives. Call [`wait`](MockInstrument::wait) after the client has
/// disconnected to verify the script completed cleanly.
pub struct MockInstrument {
    /// The bound listener, moved into the server task on `start()`.
    listener: Option<TcpListener>,
    /// The address the server is listening on (e.g. "127.0.0.1:54321").
    addr: String,
    /// Ordered queue of expected command/reply pairs.
    expectations: VecDeque<Expectation>,
    /// Handle to the server task once started.
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockInstrument {
    /// Bind a new mock instrument on a random localhost port.
    ///
    /// The server does not accept connections until
    /// [`start`](MockInstrument::start) is called, allowing expectations
    /// to be loaded first. The listener is bound immediately, so a client
    /// may connect as soon as `start()` has been called.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock instrument: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            listener: Some(listener),
            addr,
            expectations: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Add an expected command line and its reply.
    ///
    /// Expectations are consumed in order. `command` is matched against
    /// the received line with the terminator stripped. `reply`, when
    /// present, is sent back followed by `\n`.
    pub fn expect(&mut self, command: &str, reply: Option<&str>) {
        self.expectations.push_back(Expectation {
            command: command.to_string(),
            reply: reply.map(str::to_string),
        });
    }

    /// Get the address the server is listening on.
    ///
    /// Use this to connect a `TcpTransport` to the mock instrument.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Start the server, accepting a single client connection and
    /// processing all expectations.
    ///
    /// This spawns a background task. Call [`wait`](MockInstrument::wait)
    /// after the client has disconnected to check for script errors.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn start(&mut self) {
        let listener = self
            .listener
            .take()
            .expect("MockInstrument::start called twice");
        let expectations: Vec<Expectation> = self.expectations.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;

            let mut reader = BufReader::new(stream);
            let mut line = String::new();

            for (i, expectation) in expectations.iter().enumerate() {
                line.clear();
                let n = reader
                    .read_line(&mut line)
                    .await
                    .map_err(|e| format!("expectation {}: read error: {}", i, e))?;
                if n == 0 {
                    return Err(format!(
                        "expectation {}: client disconnected (expected {:?})",
                        i, expectation.command
                    ));
                }

                let received = line.trim_end_matches(['\r', '\n']);
                if received != expectation.command {
                    return Err(format!(
                        "expectation {}: command mismatch: expected {:?}, got {:?}",
                        i, expectation.command, received
                    ));
                }

                if let Some(reply) = &expectation.reply {
                    let stream = reader.get_mut();
                    stream
                        .write_all(format!("{}\n", reply).as_bytes())
                        .await
                        .map_err(|e| format!("expectation {}: write error: {}", i, e))?;
                    stream
                        .flush()
                        .await
                        .map_err(|e| format!("expectation {}: flush error: {}", i, e))?;
                }
            }

            // Script complete. Hold the connection open until the client
            // closes it; any further command is a failure.
            line.clear();
            let n = reader
                .read_line(&mut line)
                .await
                .map_err(|e| format!("post-script read error: {}", e))?;
            if n > 0 {
                return Err(format!(
                    "unexpected command after script end: {:?}",
                    line.trim_end_matches(['\r', '\n'])
                ));
            }

            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to complete and return any script errors.
    ///
    /// Call this after the client has closed its connection to verify
    /// that all expectations were met.
    pub async fn wait(self) -> std::result::Result<(), String> {
        if let Some(handle) = self.server_handle {
            handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use sweeplib_core::transport::Transport;
    use sweeplib_transport::TcpTransport;

    #[tokio::test]
    async fn scripted_query_and_set() {
        let mut server = MockInstrument::bind().await.unwrap();
        server.expect("*IDN?", Some("Acme,SA-2400,0042,1.03"));
        server.expect(":FREQ 2400000000", None);
        server.expect(":CALC:MARK1:Y?", Some("-42.0"));
        let addr = server.addr().to_string();
        server.start();

        let mut transport = TcpTransport::connect(&addr).await.unwrap();

        transport.send(b"*IDN?\n").await.unwrap();
        let mut buf = [0u8; 128];
        let n = transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"Acme,SA-2400,0042,1.03\n");

        transport.send(b":FREQ 2400000000\n").await.unwrap();

        transport.send(b":CALC:MARK1:Y?\n").await.unwrap();
        let n = transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"-42.0\n");

        transport.close().await.unwrap();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_command_fails_the_script() {
        let mut server = MockInstrument::bind().await.unwrap();
        server.expect("*IDN?", Some("x"));
        let addr = server.addr().to_string();
        server.start();

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        transport.send(b":FREQ 1\n").await.unwrap();
        transport.close().await.unwrap();

        let result = server.wait().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("command mismatch"));
    }

    #[tokio::test]
    async fn extra_command_after_script_fails() {
        let mut server = MockInstrument::bind().await.unwrap();
        server.expect(":FREQ 1", None);
        let addr = server.addr().to_string();
        server.start();

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        transport.send(b":FREQ 1\n").await.unwrap();
        transport.send(b":FREQ 2\n").await.unwrap();
        transport.close().await.unwrap();

        let result = server.wait().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("unexpected command"));
    }
}
