//! sweeplib-test-harness: Test utilities and mock instruments for sweeplib.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the session and sweep engine without hardware, and [`MockInstrument`],
//! a scripted SCPI server on a random localhost port, for end-to-end tests
//! over a real TCP connection.

pub mod mock_instrument;
pub mod mock_transport;

pub use mock_instrument::MockInstrument;
pub use mock_transport::MockTransport;
