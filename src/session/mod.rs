//! Logical session over a replaceable transport.
//!
//! The session survives transport replacement: pending requests, listeners
//! and the retry counter live here, while each reconnect builds a fresh
//! [`Transport`](crate::transport::Transport).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`SessionBuilder`] and validated [`Options`] |
//! | `cookie` | [`CookieJar`] persistence |
//! | `core` | [`Session`] handle and event pump |
//! | `lifecycle` | Retry policy state machine |
//! | `listener` | Named [`Listener`] registry |
//! | `request` | Correlation, deduplication and timeouts |

// ============================================================================
// Submodules
// ============================================================================

/// Session configuration builder.
pub mod builder;

/// Cookie persistence.
pub mod cookie;

/// Session handle.
pub mod core;

/// Connection lifecycle.
pub mod lifecycle;

/// Listener registry.
pub mod listener;

/// Request tracking.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{DEFAULT_RECONNECT_DELAY, HeadersProvider, Options, SessionBuilder};
pub use cookie::{CookieJar, MemoryCookieJar, StoredCookie};
pub use core::Session;
pub use lifecycle::{CloseDecision, Lifecycle, LifecycleState};
pub use listener::{
    DEFAULT_LISTENER, EventHandler, HandlerId, Listener, ListenerRegistry, SessionEvent,
};
pub use request::{DEFAULT_REQUEST_TIMEOUT, MutexKey, RequestOptions, ResponseFuture};
