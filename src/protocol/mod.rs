//! Wire protocol types.
//!
//! This module defines the binary frame format and the JSON bodies it
//! carries between client and server.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `NORMAL` | Both | Request, response, notification or push envelope |
//! | `PING` / `PONG` | Client → Server / Server → Client | Heartbeat |
//! | `HANDSHAKE` | Client → Server | Version, headers, replayed cookies |
//! | `READY` | Server → Client | Handshake accepted |
//! | `KICK` | Server → Client | Forced disconnect |
//! | `COOKIE` | Server → Client | Session-affinity token |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | 4-byte header codec and [`FrameKind`] |
//! | `event` | Control frame bodies |
//! | `request` | Application envelopes |

// ============================================================================
// Submodules
// ============================================================================

/// Control frame bodies.
pub mod event;

/// Binary frame codec.
pub mod frame;

/// Application envelopes.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{Cookie, Handshake, HandshakeCookies, Kick, epoch_millis};
pub use frame::{Frame, FrameKind, HEADER_SIZE, MAX_BODY_LEN, decode, encode, encode_empty};
pub use request::{Incoming, Notification, Request};
