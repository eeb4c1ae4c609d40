//! Error types for the session client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use tsingtao::{Result, Session};
//! use serde_json::json;
//!
//! async fn example(session: &Session) -> Result<()> {
//!     if let Some(reply) = session.request("user.profile", json!({ "uid": 1 })) {
//!         let body = reply.await?;
//!         println!("{body}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUri`] |
//! | Connection | [`Error::ConnectionClosed`], [`Error::Inactive`], [`Error::Tls`] |
//! | Protocol | [`Error::Protocol`], [`Error::FrameTooLarge`], [`Error::UnknownFrameKind`] |
//! | Execution | [`Error::RequestTimeout`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URI cannot be used.
    ///
    /// Returned when the URI does not parse or names an unknown scheme.
    #[error("Invalid URI {uri}: {message}")]
    InvalidUri {
        /// The offending URI.
        uri: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The transport task is gone.
    ///
    /// Returned when writing to a transport whose connection already ended.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No frame arrived within the inactivity timeout.
    ///
    /// Raised by the transport watchdog; the session turns it into a close.
    #[error("Inactive for {idle_ms}ms (timeout {timeout_ms}ms)")]
    Inactive {
        /// Milliseconds since the last decoded frame.
        idle_ms: u64,
        /// Configured inactivity timeout.
        timeout_ms: u64,
    },

    /// TLS setup failed for a secure endpoint.
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Frame body does not fit the 24-bit length field.
    #[error("Frame body of {length} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Body length that was attempted.
        length: usize,
        /// Largest encodable body length.
        max: usize,
    },

    /// Frame header names an event type outside the protocol.
    #[error("Unknown frame kind: {kind}")]
    UnknownFrameKind {
        /// Raw event type byte.
        kind: u8,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Request received no response in time.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URI error.
    #[inline]
    pub fn invalid_uri(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Creates an inactivity error.
    #[inline]
    pub fn inactive(idle_ms: u64, timeout_ms: u64) -> Self {
        Self::Inactive {
            idle_ms,
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a frame too large error.
    #[inline]
    pub fn frame_too_large(length: usize, max: usize) -> Self {
        Self::FrameTooLarge { length, max }
    }

    /// Creates an unknown frame kind error.
    #[inline]
    pub fn unknown_frame_kind(kind: u8) -> Self {
        Self::UnknownFrameKind { kind }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. } | Self::Inactive { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::Inactive { .. }
                | Self::Tls(_)
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a wire protocol error.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::FrameTooLarge { .. } | Self::UnknownFrameKind { .. }
        )
    }

}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("version is required");
        assert_eq!(err.to_string(), "Configuration error: version is required");
    }

    #[test]
    fn test_invalid_uri_display() {
        let err = Error::invalid_uri("gopher://x", "unknown scheme gopher");
        assert_eq!(
            err.to_string(),
            "Invalid URI gopher://x: unknown scheme gopher"
        );
    }

    #[test]
    fn test_request_timeout_display() {
        let err = Error::request_timeout(RequestId::new(7), 5000);
        assert_eq!(err.to_string(), "Request 7 timed out after 5000ms");
    }

    #[test]
    fn test_frame_too_large_display() {
        let err = Error::frame_too_large(16_777_216, 16_777_215);
        assert_eq!(
            err.to_string(),
            "Frame body of 16777216 bytes exceeds maximum of 16777215 bytes"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(RequestId::new(1), 5000);
        let other_err = Error::ConnectionClosed;

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_inactive_is_timeout_and_connection_error() {
        let err = Error::inactive(31_000, 30_000);
        assert!(err.is_timeout());
        assert!(err.is_connection_error());
        assert_eq!(err.to_string(), "Inactive for 31000ms (timeout 30000ms)");
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(Error::unknown_frame_kind(9).is_protocol_error());
        assert!(Error::frame_too_large(1, 0).is_protocol_error());
        assert!(!Error::ConnectionClosed.is_protocol_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
