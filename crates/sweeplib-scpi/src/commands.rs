//! The SCPI command lines used by the session.
//!
//! All commands are plain ASCII, terminated with `\n` by the line layer.
//! Queries end with `?` and elicit exactly one reply line; set commands
//! elicit none.

/// Identification query, used as the connect-time liveness check.
pub const IDN_QUERY: &str = "*IDN?";

/// Move marker 1 to the trace maximum.
pub const MARKER_TO_PEAK: &str = ":CALC:MARK1:MAX";

/// Query marker 1's Y value (power in dBm at the marker).
pub const MARKER_POWER_QUERY: &str = ":CALC:MARK1:Y?";

/// Query marker 1's X value (frequency in hertz at the marker).
pub const MARKER_FREQUENCY_QUERY: &str = ":CALC:MARK1:X?";

/// Build the frequency set command for a value in hertz.
///
/// Uses Rust's locale-independent `f64` formatting: integral values print
/// without a fractional part (`:FREQ 2400000000`), fractional values keep
/// their shortest round-trippable form.
pub fn set_frequency(hz: f64) -> String {
    format!(":FREQ {}", hz)
}

/// Whether a raw command line is a query (elicits one reply line).
pub fn is_query(command: &str) -> bool {
    command.trim_end().ends_with('?')
}
