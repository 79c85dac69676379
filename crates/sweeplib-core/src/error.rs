//! Error types for sweeplib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! sweep-level errors are all captured here.

/// The error type for all sweeplib operations.
///
/// Variants cover the full range of failure modes encountered when driving
/// a SCPI instrument over TCP: connection setup failures, timeouts, I/O
/// errors, unparseable replies, and sweep precondition violations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No connection to the instrument has been established.
    #[error("not connected")]
    NotConnected,

    /// Connecting to the instrument failed.
    ///
    /// Covers socket setup failures as well as a failed `*IDN?` liveness
    /// check: the session only becomes connected once both succeed.
    #[error("connection failed: {cause}")]
    ConnectionFailed {
        /// Human-readable description of what went wrong.
        cause: String,
    },

    /// Timed out waiting for a reply from the instrument.
    ///
    /// This typically indicates the instrument is busy retuning, powered
    /// off, or the command sent was not a query.
    #[error("timeout waiting for response")]
    Timeout,

    /// The connection to the instrument was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// A transport-level error (socket setup, mock expectation mismatch).
    #[error("transport error: {0}")]
    Transport(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The instrument replied with text that is not a valid number.
    ///
    /// This is recoverable per sweep step: the step is skipped and the
    /// sweep continues.
    #[error("unparseable instrument reply: {raw:?}")]
    Parse {
        /// The raw reply text as received (trimmed).
        raw: String,
    },

    /// A sweep range failed validation (start >= stop, or step <= 0).
    #[error("invalid sweep range: start {start_hz} Hz, stop {stop_hz} Hz, step {step_hz} Hz")]
    InvalidRange {
        /// Requested start frequency in hertz.
        start_hz: f64,
        /// Requested stop frequency in hertz.
        stop_hz: f64,
        /// Requested step size in hertz.
        step_hz: f64,
    },

    /// An auto-tune pass finished without a single valid sample, so there
    /// is no best frequency to tune to.
    #[error("sweep produced no valid samples")]
    NoValidSamples,
}

impl Error {
    /// Whether this error indicates the connection itself is unusable.
    ///
    /// Connection-fatal errors abort the current operation and drive the
    /// session toward the disconnected state so subsequent operations fail
    /// fast with [`Error::NotConnected`]. [`Error::Parse`] is deliberately
    /// not fatal: a garbled reply skips one sweep step, nothing more.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Error::NotConnected
                | Error::ConnectionFailed { .. }
                | Error::Timeout
                | Error::ConnectionLost
                | Error::Transport(_)
                | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
