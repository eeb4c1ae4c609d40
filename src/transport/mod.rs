//! WebSocket transport layer.
//!
//! This module owns the physical connection: dialing, framing, heartbeat,
//! liveness and the close handshake.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   commands   ┌──────────────────┐   WebSocket   ┌──────────┐
//! │  Transport      │─────────────►│  EventLoop task  │◄─────────────►│  Server  │
//! │  (handle)       │              │  heartbeat       │   binary      │          │
//! │                 │◄─────────────│  watchdog        │   frames      │          │
//! └─────────────────┘    events    └──────────────────┘               └──────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Transport::open` - Spawn the event loop, status `CONNECTING`
//! 2. `TransportEvent::Open` - Socket upgraded, status `OPEN`
//! 3. `TransportEvent::Ready` - Server accepted handshake, heartbeat starts
//! 4. `Transport::close` or peer close - status `CLOSING` then `CLOSED`
//! 5. `TransportEvent::Close` - Final event
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Transport handle and event loop |
//! | `heartbeat` | PING/PONG scheduling and inactivity tracking |
//! | `status` | Connection status |

// ============================================================================
// Submodules
// ============================================================================

/// Transport handle and event loop.
pub mod connection;

/// Heartbeat and watchdog timing state.
mod heartbeat;

/// Connection status.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_TIMEOUT, Transport, TransportConfig, TransportEvent,
    TransportEvents, close_code,
};
pub use status::ConnectionStatus;
