//! Connection lifecycle and retry policy.
//!
//! The session's reconnect behavior as an explicit state machine:
//!
//! ```text
//!            connect            READY
//!   Idle ───────────► Connecting ─────► Open
//!                        ▲  │ close<3000    │ close<3000
//!        reconnect delay │  ▼ (budget left) ▼
//!                      Retrying ◄──────────┘
//!
//!   any close ≥ 3000, or budget exhausted ──► Terminal
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::transport::close_code;

// ============================================================================
// LifecycleState
// ============================================================================

/// Where the session is in its connect/retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Never connected.
    #[default]
    Idle,
    /// A transport is dialing or handshaking.
    Connecting,
    /// The server sent READY.
    Open,
    /// Waiting out the reconnect delay.
    Retrying,
    /// Closed for good; only an explicit connect leaves this state.
    Terminal,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Retrying => "retrying",
            Self::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

// ============================================================================
// CloseDecision
// ============================================================================

/// What the session does after a transport closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Close code was terminal; emit `close`, never reconnect.
    Terminal,
    /// Transient close within budget; reconnect after the delay.
    Retry {
        /// Retry counter after this close (1-based).
        attempt: u32,
    },
    /// Transient close with no budget left; emit `close`.
    GiveUp,
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Retry counter plus lifecycle state.
///
/// A budget of `None` or `Some(0)` means a transient close is never retried.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: LifecycleState,
    retries: u32,
    max_retries: Option<u32>,
}

impl Lifecycle {
    /// Creates an idle lifecycle with the given retry budget.
    #[inline]
    #[must_use]
    pub const fn new(max_retries: Option<u32>) -> Self {
        Self {
            state: LifecycleState::Idle,
            retries: 0,
            max_retries,
        }
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Consecutive transient closes since the last READY or terminal close.
    #[inline]
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// A transport was created.
    pub fn on_connect(&mut self) {
        self.state = LifecycleState::Connecting;
    }

    /// The server accepted the handshake.
    pub fn on_ready(&mut self) {
        self.retries = 0;
        self.state = LifecycleState::Open;
    }

    /// The transport closed with `code`.
    pub fn on_close(&mut self, code: u16) -> CloseDecision {
        if close_code::is_terminal(code) {
            self.retries = 0;
            self.state = LifecycleState::Terminal;
            return CloseDecision::Terminal;
        }

        self.retries += 1;
        let within_budget = self
            .max_retries
            .is_some_and(|max| max > 0 && self.retries <= max);

        if within_budget {
            self.state = LifecycleState::Retrying;
            CloseDecision::Retry {
                attempt: self.retries,
            }
        } else {
            self.retries = 0;
            self.state = LifecycleState::Terminal;
            CloseDecision::GiveUp
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(None)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_close_resets_and_never_retries() {
        let mut lifecycle = Lifecycle::new(Some(5));
        lifecycle.on_connect();
        assert_eq!(lifecycle.on_close(1006), CloseDecision::Retry { attempt: 1 });

        assert_eq!(lifecycle.on_close(3000), CloseDecision::Terminal);
        assert_eq!(lifecycle.retries(), 0);
        assert_eq!(lifecycle.state(), LifecycleState::Terminal);

        assert_eq!(lifecycle.on_close(3001), CloseDecision::Terminal);
    }

    #[test]
    fn test_transient_close_increments_by_one() {
        let mut lifecycle = Lifecycle::new(Some(3));
        lifecycle.on_connect();

        assert_eq!(lifecycle.on_close(1000), CloseDecision::Retry { attempt: 1 });
        assert_eq!(lifecycle.retries(), 1);
        assert_eq!(lifecycle.state(), LifecycleState::Retrying);
    }

    #[test]
    fn test_gives_up_on_third_close_with_budget_two() {
        let mut lifecycle = Lifecycle::new(Some(2));

        assert_eq!(lifecycle.on_close(1006), CloseDecision::Retry { attempt: 1 });
        assert_eq!(lifecycle.on_close(1006), CloseDecision::Retry { attempt: 2 });
        assert_eq!(lifecycle.on_close(1006), CloseDecision::GiveUp);
        assert_eq!(lifecycle.retries(), 0);
        assert_eq!(lifecycle.state(), LifecycleState::Terminal);
    }

    #[test]
    fn test_no_budget_never_retries() {
        let mut unset = Lifecycle::new(None);
        assert_eq!(unset.on_close(1006), CloseDecision::GiveUp);
        assert_eq!(unset.retries(), 0);

        let mut zero = Lifecycle::new(Some(0));
        assert_eq!(zero.on_close(1006), CloseDecision::GiveUp);
        assert_eq!(zero.retries(), 0);
    }

    #[test]
    fn test_ready_resets_counter() {
        let mut lifecycle = Lifecycle::new(Some(2));
        lifecycle.on_close(1006);
        lifecycle.on_close(1006);
        assert_eq!(lifecycle.retries(), 2);

        lifecycle.on_connect();
        lifecycle.on_ready();
        assert_eq!(lifecycle.retries(), 0);
        assert_eq!(lifecycle.state(), LifecycleState::Open);

        assert_eq!(lifecycle.on_close(1006), CloseDecision::Retry { attempt: 1 });
    }

    #[test]
    fn test_default_is_idle_without_budget() {
        let lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), LifecycleState::Idle);
        assert_eq!(lifecycle.state().to_string(), "idle");
    }
}
