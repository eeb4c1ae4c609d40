//! Connection status shared between a transport handle and its task.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicI8, Ordering};

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Ready state of the physical connection.
///
/// Numeric values match the WebSocket `readyState` convention, with
/// [`ConnectionStatus::Unknown`] reported when no transport exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum ConnectionStatus {
    /// No transport exists.
    Unknown = -1,
    /// Socket is being opened.
    Connecting = 0,
    /// Socket is open; frames may be sent.
    Open = 1,
    /// Close has been requested.
    Closing = 2,
    /// Socket is closed.
    Closed = 3,
}

impl ConnectionStatus {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> i8 {
        self as i8
    }

    /// Returns `true` if frames may be sent.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    #[inline]
    const fn from_code(code: i8) -> Self {
        match code {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            3 => Self::Closed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

// ============================================================================
// StatusCell
// ============================================================================

/// Atomic [`ConnectionStatus`] cell.
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicI8);

impl StatusCell {
    pub(crate) const fn new(status: ConnectionStatus) -> Self {
        Self(AtomicI8::new(status.code()))
    }

    #[inline]
    pub(crate) fn get(&self) -> ConnectionStatus {
        ConnectionStatus::from_code(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set(&self, status: ConnectionStatus) {
        self.0.store(status.code(), Ordering::Release);
    }

    /// Moves from `Connecting` to `Open`.
    ///
    /// Returns `false` if a close was requested first.
    pub(crate) fn open(&self) -> bool {
        self.0
            .compare_exchange(
                ConnectionStatus::Connecting.code(),
                ConnectionStatus::Open.code(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Moves to `Closing` unless already closed.
    ///
    /// Returns `false` if the connection was already `Closed`.
    pub(crate) fn begin_close(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |code| {
                match ConnectionStatus::from_code(code) {
                    ConnectionStatus::Closed => None,
                    _ => Some(ConnectionStatus::Closing.code()),
                }
            })
            .is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ConnectionStatus::Unknown.code(), -1);
        assert_eq!(ConnectionStatus::Connecting.code(), 0);
        assert_eq!(ConnectionStatus::Open.code(), 1);
        assert_eq!(ConnectionStatus::Closing.code(), 2);
        assert_eq!(ConnectionStatus::Closed.code(), 3);
    }

    #[test]
    fn test_cell_round_trip() {
        let cell = StatusCell::new(ConnectionStatus::Connecting);
        assert_eq!(cell.get(), ConnectionStatus::Connecting);
        cell.set(ConnectionStatus::Open);
        assert!(cell.get().is_open());
    }

    #[test]
    fn test_open_only_from_connecting() {
        let cell = StatusCell::new(ConnectionStatus::Connecting);
        assert!(cell.open());
        assert_eq!(cell.get(), ConnectionStatus::Open);
        assert!(!cell.open());
    }

    #[test]
    fn test_close_during_dial_keeps_closing() {
        let cell = StatusCell::new(ConnectionStatus::Connecting);
        assert!(cell.begin_close());

        assert!(!cell.open());
        assert_eq!(cell.get(), ConnectionStatus::Closing);
    }

    #[test]
    fn test_begin_close_skips_closed() {
        let cell = StatusCell::new(ConnectionStatus::Open);
        assert!(cell.begin_close());
        assert_eq!(cell.get(), ConnectionStatus::Closing);

        cell.set(ConnectionStatus::Closed);
        assert!(!cell.begin_close());
        assert_eq!(cell.get(), ConnectionStatus::Closed);
    }
}
