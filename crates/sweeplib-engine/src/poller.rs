//! The poller state machine.
//!
//! Pure state transitions, kept separate from the worker loop so the
//! stop-wins-over-resume rule is testable without any I/O or timing.

use sweeplib_core::types::PollerState;

/// Tracks whether periodic sweeps are stopped, running, or suspended.
///
/// Transitions:
///
/// ```text
/// Stopped --start()--> Running
/// Running --suspend()--> Suspended
/// Suspended --resume()--> Running
/// Running | Suspended --stop()--> Stopped
/// ```
///
/// `suspend` only acts on `Running` and `resume` only acts on
/// `Suspended`, so a `stop` issued while suspended sticks: the later
/// `resume` finds `Stopped` and leaves it alone.
#[derive(Debug)]
pub struct Poller {
    state: PollerState,
}

impl Poller {
    /// A new poller in the stopped state.
    pub fn new() -> Self {
        Poller {
            state: PollerState::Stopped,
        }
    }

    /// Current state.
    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Whether a tick should run a sweep cycle right now.
    pub fn is_running(&self) -> bool {
        self.state == PollerState::Running
    }

    /// Begin polling. Only acts from `Stopped`; returns whether the state
    /// changed.
    pub fn start(&mut self) -> bool {
        if self.state == PollerState::Stopped {
            self.state = PollerState::Running;
            true
        } else {
            false
        }
    }

    /// Halt polling from any state; returns whether the state changed.
    pub fn stop(&mut self) -> bool {
        if self.state != PollerState::Stopped {
            self.state = PollerState::Stopped;
            true
        } else {
            false
        }
    }

    /// Pause a running poller while another operation holds the session;
    /// returns whether the state changed.
    pub fn suspend(&mut self) -> bool {
        if self.state == PollerState::Running {
            self.state = PollerState::Suspended;
            true
        } else {
            false
        }
    }

    /// Return from `Suspended` to `Running`; returns whether the state
    /// changed. A poller stopped while suspended stays stopped.
    pub fn resume(&mut self) -> bool {
        if self.state == PollerState::Suspended {
            self.state = PollerState::Running;
            true
        } else {
            false
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}
