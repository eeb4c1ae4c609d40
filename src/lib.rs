//! Tsingtao - persistent-session protocol client.
//!
//! Keeps one logical session alive over an unreliable WebSocket, multiplexes
//! request/response traffic and server pushes over it, and recovers from
//! abnormal disconnects.
//!
//! # Architecture
//!
//! - **Transport**: one physical connection. Binary framing, heartbeat,
//!   inactivity watchdog, close handshake.
//! - **Session**: outlives transports. Handshake, retry policy, request
//!   correlation with deduplication and timeouts, listener fan-out.
//!
//! Close codes of 3000 and above are terminal (local close, server kick);
//! anything below is transient and retried within the configured budget.
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use tsingtao::{Result, Session, SessionEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder()
//!         .version("1.0")
//!         .max_retries(5)
//!         .build("wss://chat.example.com/socket")?;
//!
//!     let mut events = session.default_listener().subscribe();
//!     session.connect()?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let SessionEvent::Ready(_) = event {
//!             break;
//!         }
//!     }
//!
//!     if let Some(response) = session.request("room.join", json!({ "room": 42 })) {
//!         println!("joined: {}", response.await?);
//!     }
//!
//!     session.close(None);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Request id newtype and allocator |
//! | [`protocol`] | Wire frame codec and bodies |
//! | [`session`] | [`Session`], builder, listeners |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Request identifiers.
pub mod identifiers;

/// Wire protocol: frame codec and JSON bodies.
pub mod protocol;

/// Logical session, configuration and listeners.
pub mod session;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::RequestId;

// Protocol types
pub use protocol::{Frame, FrameKind};

// Session types
pub use session::{
    CookieJar, HandlerId, LifecycleState, Listener, MemoryCookieJar, MutexKey, Options,
    RequestOptions, ResponseFuture, Session, SessionBuilder, SessionEvent,
};

// Transport types
pub use transport::{ConnectionStatus, Transport, TransportConfig, TransportEvent};
