//! Transport trait for instrument communication.
//!
//! The [`Transport`] trait abstracts over the byte stream to the
//! instrument. The production implementation is a TCP socket
//! (`sweeplib-transport`); tests substitute a scripted mock from
//! `sweeplib-test-harness`.
//!
//! Line framing and SCPI semantics live above this trait, in
//! `sweeplib-scpi`, so both real and mock transports exercise the exact
//! same protocol path.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to an instrument.
///
/// Implementations handle connection state and error mapping at the
/// socket layer. Protocol concerns (line terminators, command/reply
/// pairing) are handled by the session that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the instrument.
    ///
    /// Implementations should not return until all bytes have been written
    /// to the underlying stream.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the instrument into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
