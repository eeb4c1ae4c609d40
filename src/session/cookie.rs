//! Session-affinity cookie persistence.
//!
//! The server pushes cookies in COOKIE frames; the session hands them to
//! the host's [`CookieJar`] and replays the `session` cookie in the next
//! handshake.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

// ============================================================================
// CookieJar
// ============================================================================

/// Host-supplied cookie storage.
pub trait CookieJar: Send + Sync {
    /// Stores `value` under `key` until `expires` (epoch milliseconds).
    fn set_cookie(&self, key: &str, value: Value, expires: u64);

    /// Returns the stored value, or `Value::Null` if none.
    fn get_cookie(&self, key: &str) -> Value;
}

// ============================================================================
// MemoryCookieJar
// ============================================================================

/// Stored cookie value and expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCookie {
    /// Opaque value.
    pub value: Value,
    /// Expiry, epoch milliseconds.
    pub expires: u64,
}

/// In-process [`CookieJar`]; cookies last as long as the jar.
///
/// Expiry is recorded but not enforced.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<FxHashMap<String, StoredCookie>>,
}

impl MemoryCookieJar {
    /// Creates an empty jar.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar pre-seeded with one cookie.
    #[must_use]
    pub fn with_cookie(key: impl Into<String>, value: Value, expires: u64) -> Self {
        let jar = Self::new();
        jar.cookies
            .lock()
            .insert(key.into(), StoredCookie { value, expires });
        jar
    }

    /// Returns the full stored entry for `key`.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<StoredCookie> {
        self.cookies.lock().get(key).cloned()
    }
}

impl CookieJar for MemoryCookieJar {
    fn set_cookie(&self, key: &str, value: Value, expires: u64) {
        self.cookies
            .lock()
            .insert(key.to_owned(), StoredCookie { value, expires });
    }

    fn get_cookie(&self, key: &str) -> Value {
        self.cookies
            .lock()
            .get(key)
            .map(|cookie| cookie.value.clone())
            .unwrap_or(Value::Null)
    }
}

// ============================================================================
// Tests
// ============================================================================
