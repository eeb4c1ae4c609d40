//! Heartbeat and inactivity bookkeeping.
//!
//! Pure timing state driven by the connection event loop; no I/O here.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::Instant;

// ============================================================================
// Heartbeat
// ============================================================================

/// PING/PONG scheduler.
///
/// At most one ping is scheduled or outstanding at a time. A PONG clears
/// the outstanding ping, records the round trip and schedules the next.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    interval: Duration,
    /// When the scheduled ping should go out.
    due: Option<Instant>,
    /// When the outstanding ping was sent.
    sent_at: Option<Instant>,
}

impl Heartbeat {
    pub(crate) const fn new(interval: Duration) -> Self {
        Self {
            interval,
            due: None,
            sent_at: None,
        }
    }

    /// Schedules the next ping one interval from `now`.
    ///
    /// No-op while a ping is already scheduled or outstanding.
    pub(crate) fn arm(&mut self, now: Instant) {
        if self.due.is_some() || self.sent_at.is_some() {
            return;
        }
        self.due = Some(now + self.interval);
    }

    /// Deadline of the scheduled ping.
    #[inline]
    pub(crate) fn due(&self) -> Option<Instant> {
        self.due
    }

    /// Marks the scheduled ping as sent.
    pub(crate) fn fire(&mut self, now: Instant) {
        self.due = None;
        self.sent_at = Some(now);
    }

    /// Handles a PONG; returns the round trip and re-arms.
    ///
    /// A PONG with no ping outstanding yields no measurement.
    pub(crate) fn on_pong(&mut self, now: Instant) -> Option<Duration> {
        let distance = self.sent_at.take().map(|sent| now.duration_since(sent));
        self.arm(now);
        distance
    }

    /// Drops any scheduled or outstanding ping.
    pub(crate) fn cancel(&mut self) {
        self.due = None;
        self.sent_at = None;
    }
}

// ============================================================================
// Watchdog
// ============================================================================

/// Inactivity tracker.
#[derive(Debug)]
pub(crate) struct Watchdog {
    timeout: Duration,
    last_active: Instant,
}

impl Watchdog {
    pub(crate) const fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_active: now,
        }
    }

    /// Records activity.
    #[inline]
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_active = now;
    }

    /// Returns the idle time if it exceeds the timeout.
    pub(crate) fn expired(&self, now: Instant) -> Option<Duration> {
        let idle = now.duration_since(self.last_active);
        (idle > self.timeout).then_some(idle)
    }

    #[inline]
    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }
}

// ============================================================================
// Tests
// ============================================================================
