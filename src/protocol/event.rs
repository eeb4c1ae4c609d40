//! Control frame bodies.
//!
//! JSON payloads of HANDSHAKE, READY, KICK and COOKIE frames.
//!
//! | Frame | Direction | Body |
//! |-------|-----------|------|
//! | `HANDSHAKE` | Client → Server | [`Handshake`] |
//! | `READY` | Server → Client | any JSON |
//! | `KICK` | Server → Client | [`Kick`] |
//! | `COOKIE` | Server → Client | [`Cookie`] |

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Handshake
// ============================================================================

/// Greeting sent as soon as the socket opens.
///
/// # Format
///
/// ```json
/// {
///   "version": "1.0",
///   "date": 1700000000000,
///   "headers": { "x-device": "ios" },
///   "cookies": { "session": "abc" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Handshake {
    /// Client protocol version.
    pub version: String,
    /// Epoch milliseconds at send time.
    pub date: u64,
    /// Extra metadata supplied by the host.
    pub headers: HashMap<String, String>,
    /// Replayed affinity cookies.
    pub cookies: HandshakeCookies,
}

/// Cookies replayed in the handshake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandshakeCookies {
    /// Stored `session` cookie value (`null` when none).
    pub session: Value,
}

impl Handshake {
    /// Creates a handshake stamped with the current time.
    #[must_use]
    pub fn new(version: impl Into<String>, headers: HashMap<String, String>, session: Value) -> Self {
        Self {
            version: version.into(),
            date: epoch_millis(),
            headers,
            cookies: HandshakeCookies { session },
        }
    }
}

// ============================================================================
// Cookie
// ============================================================================

/// Session-affinity token pushed by the server.
///
/// # Format
///
/// ```json
/// { "key": "session", "value": "xyz", "expires": 1700000000000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub key: String,
    /// Opaque value.
    #[serde(default)]
    pub value: Value,
    /// Expiry, epoch milliseconds.
    #[serde(default)]
    pub expires: u64,
}

// ============================================================================
// Kick
// ============================================================================

/// Server-forced disconnect notice.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Kick {
    /// Human-readable reason.
    #[serde(default)]
    pub reason: String,
}

// ============================================================================
// Helpers
// ============================================================================

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_handshake_serialization() {
        let handshake = Handshake::new("1.0", HashMap::new(), json!("abc"));
        let value = serde_json::to_value(&handshake).expect("serialize");

        assert_eq!(value["version"], "1.0");
        assert_eq!(value["headers"], json!({}));
        assert_eq!(value["cookies"], json!({ "session": "abc" }));
        assert!(value["date"].as_u64().expect("date") > 0);
    }

    #[test]
    fn test_handshake_without_cookie() {
        let handshake = Handshake::new("2", HashMap::new(), Value::Null);
        let value = serde_json::to_value(&handshake).expect("serialize");
        assert_eq!(value["cookies"]["session"], Value::Null);
    }

    #[test]
    fn test_cookie_parse() {
        let cookie: Cookie = serde_json::from_str(
            r#"{"key": "session", "value": "xyz", "expires": 1700000000000}"#,
        )
        .expect("parse");

        assert_eq!(cookie.key, "session");
        assert_eq!(cookie.value, json!("xyz"));
        assert_eq!(cookie.expires, 1_700_000_000_000);
    }

    #[test]
    fn test_kick_defaults_reason() {
        let kick: Kick = serde_json::from_str("{}").expect("parse");
        assert_eq!(kick.reason, "");

        let kick: Kick = serde_json::from_str(r#"{"reason": "duplicate login"}"#).expect("parse");
        assert_eq!(kick.reason, "duplicate login");
    }
}
