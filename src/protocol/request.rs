//! Application envelopes carried in NORMAL frames.
//!
//! Outgoing envelopes are requests (correlated by id) and notifications
//! (no id). Incoming envelopes are responses (with id) or pushes (keyed
//! by `event` name).

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::RequestId;

// ============================================================================
// Request
// ============================================================================

/// A request awaiting a correlated response.
///
/// # Format
///
/// ```json
/// { "id": 1, "route": "user.profile", "params": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request<'a> {
    /// Correlation id.
    pub id: RequestId,
    /// Server-side route.
    pub route: &'a str,
    /// Route parameters.
    pub params: &'a Value,
}

impl<'a> Request<'a> {
    /// Creates a request.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, route: &'a str, params: &'a Value) -> Self {
        Self { id, route, params }
    }
}

// ============================================================================
// Notification
// ============================================================================

/// A fire-and-forget message; the server never answers it.
///
/// # Format
///
/// ```json
/// { "route": "chat.typing", "params": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification<'a> {
    /// Server-side route.
    pub route: &'a str,
    /// Route parameters.
    pub params: &'a Value,
}

impl<'a> Notification<'a> {
    /// Creates a notification.
    #[inline]
    #[must_use]
    pub fn new(route: &'a str, params: &'a Value) -> Self {
        Self { route, params }
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// An envelope received from the server.
///
/// # Format
///
/// Response:
/// ```json
/// { "id": 1, "body": { ... } }
/// ```
///
/// Push:
/// ```json
/// { "event": "chat.message", "body": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Incoming {
    /// Correlation id (responses only).
    #[serde(default)]
    pub id: Option<u32>,

    /// Event name (pushes only).
    #[serde(default)]
    pub event: Option<String>,

    /// Payload.
    #[serde(default)]
    pub body: Value,
}

impl Incoming {
    /// Returns the correlation id if this envelope answers a request.
    ///
    /// An id of `0` counts as absent.
    #[inline]
    #[must_use]
    pub fn response_id(&self) -> Option<RequestId> {
        self.id.filter(|id| *id != 0).map(RequestId::new)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let params = json!({ "uid": 5 });
        let request = Request::new(RequestId::new(3), "user.profile", &params);
        let value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(
            value,
            json!({ "id": 3, "route": "user.profile", "params": { "uid": 5 } })
        );
    }

    #[test]
    fn test_notification_has_no_id() {
        let params = json!([]);
        let value = serde_json::to_value(Notification::new("chat.typing", &params))
            .expect("serialize");

        assert!(value.get("id").is_none());
        assert_eq!(value["route"], "chat.typing");
    }

    #[test]
    fn test_incoming_response() {
        let incoming: Incoming =
            serde_json::from_str(r#"{"id": 12, "body": {"ok": true}}"#).expect("parse");
        assert_eq!(incoming.response_id(), Some(RequestId::new(12)));
                assert_eq!(incoming.body["ok"], true);
    }

    #[test]
    fn test_incoming_push() {
        let incoming: Incoming =
            serde_json::from_str(r#"{"event": "chat.message", "body": "hi"}"#).expect("parse");
        assert_eq!(incoming.response_id(), None);
        assert_eq!(incoming.event.as_deref(), Some("chat.message"));
        assert_eq!(incoming.body, json!("hi"));
    }

    #[test]
    fn test_incoming_zero_id_is_push() {
        let incoming: Incoming =
            serde_json::from_str(r#"{"id": 0, "event": "tick"}"#).expect("parse");
        assert_eq!(incoming.response_id(), None);
        assert_eq!(incoming.body, Value::Null);
    }
}
