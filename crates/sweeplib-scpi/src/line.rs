//! `\n`-terminated line framing over a byte [`Transport`].
//!
//! The wire protocol is one command line out, at most one reply line back,
//! so no full codec is needed. Reads are still accumulated defensively
//! until a terminator or the deadline: a reply is one line logically, but
//! TCP is free to deliver it in several segments, and a single-read
//! implementation would hand back half a number.

use std::time::Duration;
use tokio::time::Instant;

use sweeplib_core::error::{Error, Result};
use sweeplib_core::transport::Transport;

/// The byte that terminates every command and reply line.
const TERMINATOR: u8 = b'\n';

/// Maximum accumulated reply size before the buffer is abandoned.
/// Replies are short numeric or identity lines; 8192 is generous headroom.
const MAX_LINE: usize = 8192;

/// Line-level I/O over an owned transport.
///
/// Bytes received past a terminator are carried over to the next
/// [`read_line`](LineIo::read_line) call, so an instrument that batches
/// replies does not desynchronize the exchange.
pub struct LineIo {
    transport: Box<dyn Transport>,
    /// Received bytes not yet consumed as a line.
    pending: Vec<u8>,
}

impl LineIo {
    /// Wrap a transport for line-level exchanges.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        LineIo {
            transport,
            pending: Vec::new(),
        }
    }

    /// Whether the underlying transport is connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Close the underlying transport.
    pub async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        self.transport.close().await
    }

    /// Send one command line, appending the terminator.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(TERMINATOR);
        self.transport.send(&data).await
    }

    /// Read one reply line, waiting up to `timeout` overall.
    ///
    /// Accumulates received chunks until a terminator arrives, then
    /// returns the line with surrounding whitespace and terminators
    /// trimmed. Fails with [`Error::Timeout`] only if no bytes at all
    /// arrive within the deadline; a partial line present when the
    /// deadline expires is returned trimmed (some instruments omit the
    /// final terminator).
    pub async fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];

        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == TERMINATOR) {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                return Ok(decode_trimmed(&line));
            }

            if self.pending.len() > MAX_LINE {
                tracing::warn!(len = self.pending.len(), "reply buffer overflow, resetting");
                self.pending.clear();
                return Err(Error::Transport(
                    "reply exceeded maximum line length".into(),
                ));
            }

            let now = Instant::now();
            if now >= deadline {
                return self.take_partial_or_timeout();
            }

            match self.transport.receive(&mut buf, deadline - now).await {
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(Error::Timeout) => return self.take_partial_or_timeout(),
                Err(e) => return Err(e),
            }
        }
    }

    /// Deadline expired: return what arrived, or `Timeout` if nothing did.
    fn take_partial_or_timeout(&mut self) -> Result<String> {
        if self.pending.is_empty() {
            Err(Error::Timeout)
        } else {
            let line = std::mem::take(&mut self.pending);
            tracing::debug!(
                len = line.len(),
                "returning unterminated reply at deadline"
            );
            Ok(decode_trimmed(&line))
        }
    }
}

/// Decode received bytes as text, trimming whitespace and terminators.
fn decode_trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}
