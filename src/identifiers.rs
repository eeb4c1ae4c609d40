//! Type-safe identifiers.
//!
//! Newtype wrappers keep correlation ids from being confused with other
//! integers flowing through the session.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// RequestId
// ============================================================================

/// Correlation id matching a response to its originating request.
///
/// Ids are positive; `0` on the wire means "no id" (a push).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u32);

impl RequestId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RequestId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// ============================================================================
// RequestIdAllocator
// ============================================================================

/// Monotonic id source owned by a session.
///
/// Ids start at 1 and are never reused while the allocator lives.
#[derive(Debug, Default)]
pub struct RequestIdAllocator {
    last: AtomicU32,
}

impl RequestIdAllocator {
    /// Creates an allocator whose first id is 1.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU32::new(0),
        }
    }

    /// Returns the next id.
    #[inline]
    pub fn next_id(&self) -> RequestId {
        RequestId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_starts_at_one() {
        let ids = RequestIdAllocator::new();
        assert_eq!(ids.next_id(), RequestId::new(1));
        assert_eq!(ids.next_id(), RequestId::new(2));
    }

    #[test]
    fn test_request_id_serializes_as_number() {
        let json = serde_json::to_string(&RequestId::new(42)).expect("serialize");
        assert_eq!(json, "42");

        let id: RequestId = serde_json::from_str("42").expect("parse");
        assert_eq!(id.as_u32(), 42);
    }

    #[test]
    fn test_display() {
        assert_eq!(RequestId::from(9).to_string(), "9");
    }
}
