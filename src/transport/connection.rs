//! WebSocket connection and event loop.
//!
//! A [`Transport`] owns exactly one physical connection. Opening it spawns
//! a tokio task that handles:
//!
//! - Dialing the endpoint (plain or TLS)
//! - Decoding incoming frames into [`TransportEvent`]s
//! - Writing outgoing frames
//! - The PING/PONG heartbeat and the inactivity watchdog
//! - The close handshake
//!
//! Events are delivered in receipt order on an unbounded channel. Exactly
//! one [`TransportEvent::Close`] is emitted per transport, and it is always
//! the last event.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use native_tls::{Identity, TlsConnector};
use serde::Serialize;
use serde_json::{Value, from_slice};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Cookie, FrameKind, Incoming, Kick, decode, encode, encode_empty};

use super::heartbeat::{Heartbeat, Watchdog};
use super::status::{ConnectionStatus, StatusCell};

// ============================================================================
// Constants
// ============================================================================

/// Watchdog poll interval.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for the peer to acknowledge a local close.
const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Close frame reasons are limited to 123 bytes by RFC 6455.
const MAX_CLOSE_REASON: usize = 123;

/// Sentinel for "no round trip measured yet".
const NO_DISTANCE: u64 = u64::MAX;

/// Default inactivity timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default heartbeat spacing.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Close codes used by the protocol.
///
/// Codes below [`TERMINAL`](close_code::TERMINAL) are transient and may be
/// retried; codes at or above it are final.
pub mod close_code {
    /// Graceful close, also used for transport errors.
    pub const NORMAL: u16 = 1000;
    /// Peer closed without a status code.
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;
    /// First terminal code.
    pub const TERMINAL: u16 = 3000;
    /// Local graceful close.
    pub const LOCAL: u16 = 3000;
    /// Server-forced kick.
    pub const KICKED: u16 = 3001;

    /// Returns `true` if `code` must not trigger a reconnect.
    #[inline]
    #[must_use]
    pub const fn is_terminal(code: u16) -> bool {
        code >= TERMINAL
    }
}

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Receiving half of a transport's event channel.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

// ============================================================================
// TransportConfig
// ============================================================================

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// PEM bundle (certificate chain + PKCS#8 key) for `wss://` client auth.
    pub cert: Option<String>,
    /// Inactivity before the watchdog raises an error.
    pub timeout: Duration,
    /// Delay between a READY/PONG and the next PING.
    pub heartbeat_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            cert: None,
            timeout: DEFAULT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Structured events emitted by a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// The socket opened.
    Open,
    /// A NORMAL frame carried a parsed envelope.
    Message(Incoming),
    /// The server pushed a cookie.
    Cookie(Cookie),
    /// The server accepted the handshake.
    Ready(Value),
    /// The socket closed. Always the last event.
    Close {
        /// Close code.
        code: u16,
        /// Close reason (may be empty).
        reason: String,
    },
    /// An I/O failure or liveness failure.
    Error(Error),
}

// ============================================================================
// TransportCommand
// ============================================================================

/// Internal commands for the event loop.
enum TransportCommand {
    /// Write an encoded frame.
    Send(Vec<u8>),
    /// Close with the given code and reason.
    Close { code: u16, reason: String },
}

// ============================================================================
// Transport
// ============================================================================

/// State shared between handles and the event loop.
#[derive(Debug)]
struct Shared {
    status: StatusCell,
    distance_ms: AtomicU64,
}

/// Handle to one physical connection.
///
/// Cloning yields another handle to the same connection. The event loop
/// shuts down once every handle is dropped.
#[derive(Debug, Clone)]
pub struct Transport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    /// Status and heartbeat readings (shared with event loop).
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TransportCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send(bytes) => write!(f, "Send({} bytes)", bytes.len()),
            Self::Close { code, reason } => write!(f, "Close({code}, {reason:?})"),
        }
    }
}

impl Transport {
    /// Starts connecting to `uri` and returns the handle plus its events.
    ///
    /// Must be called within a tokio runtime. Connection failures are
    /// reported as events, never as an `Err` here.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUri`] if the scheme is not `ws` or `wss`
    /// - [`Error::Tls`] if the client certificate cannot be loaded
    pub fn open(uri: &Url, config: TransportConfig) -> Result<(Self, TransportEvents)> {
        let connector = match uri.scheme() {
            "wss" => {
                trace!(%uri, "inited ssl websocket");
                config.cert.as_deref().map(tls_connector).transpose()?
            }
            "ws" => {
                trace!(%uri, "inited websocket");
                None
            }
            scheme => {
                return Err(Error::invalid_uri(
                    uri.as_str(),
                    format!("{scheme} is not a message socket scheme"),
                ));
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            status: StatusCell::new(ConnectionStatus::Connecting),
            distance_ms: AtomicU64::new(NO_DISTANCE),
        });

        let event_loop = EventLoop {
            uri: uri.to_string(),
            connector,
            config,
            shared: Arc::clone(&shared),
            events: event_tx,
        };
        tokio::spawn(event_loop.run(command_rx));

        Ok((Self { command_tx, shared }, event_rx))
    }

    /// Returns the connection status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.get()
    }

    /// Returns the last measured PING→PONG round trip.
    #[must_use]
    pub fn distance(&self) -> Option<Duration> {
        match self.shared.distance_ms.load(Ordering::Relaxed) {
            NO_DISTANCE => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Serializes `msg` as JSON and sends it in a frame of `kind`.
    ///
    /// Callers must check [`status`](Self::status) first; frames written
    /// before the socket opens are dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - [`Error::FrameTooLarge`] if the body exceeds the length field
    /// - [`Error::ConnectionClosed`] if the event loop has ended
    pub fn send_json<T: Serialize + ?Sized>(&self, msg: &T, kind: FrameKind) -> Result<()> {
        let body = serde_json::to_vec(msg)?;
        self.send_bytes(kind, &body)
    }

    /// Sends raw text in a frame of `kind`.
    ///
    /// # Errors
    ///
    /// Same as [`send_json`](Self::send_json), minus serialization.
    pub fn send_text(&self, text: &str, kind: FrameKind) -> Result<()> {
        self.send_bytes(kind, text.as_bytes())
    }

    fn send_bytes(&self, kind: FrameKind, body: &[u8]) -> Result<()> {
        let bytes = encode(kind, body)?;
        trace!(%kind, bytes = bytes.len(), "send message");
        self.command_tx
            .send(TransportCommand::Send(bytes))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Closes the connection with `code` and `reason`.
    ///
    /// No-op if already closed. The resulting [`TransportEvent::Close`]
    /// carries the same code and reason.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        if !self.shared.status.begin_close() {
            return;
        }

        let reason = reason.into();
        trace!(code, %reason, "close socket");
        let _ = self
            .command_tx
            .send(TransportCommand::Close { code, reason });
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// Task state for one connection.
struct EventLoop {
    uri: String,
    connector: Option<Connector>,
    config: TransportConfig,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl EventLoop {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<TransportCommand>) {
        let start = Instant::now();
        let mut watchdog = Watchdog::new(self.config.timeout, start);
        let mut tick = interval_at(start + WATCHDOG_INTERVAL, WATCHDOG_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let Some(ws) = self.connect(&mut command_rx, &watchdog, &mut tick).await else {
            return;
        };

        // A close requested mid-dial stays queued and wins over Open
        if self.shared.status.open() {
            debug!(uri = %self.uri, "WebSocket connection established");
            self.emit(TransportEvent::Open);
        } else {
            debug!(uri = %self.uri, "Socket opened after close was requested");
        }

        let (mut ws_write, mut ws_read) = ws.split();
        let mut heartbeat = Heartbeat::new(self.config.heartbeat_interval);

        loop {
            let ping_due = heartbeat.due();

            tokio::select! {
                // Incoming frames from server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Binary(data))) => {
                            let close_request = if data.is_empty() {
                                debug!("Empty message from peer, closing");
                                Some((close_code::NORMAL, String::new()))
                            } else {
                                trace!(bytes = data.len(), "receive message");
                                self.handle_frame(&data, &mut heartbeat, &mut watchdog)
                            };

                            if let Some((code, reason)) = close_request {
                                heartbeat.cancel();
                                self.close_locally(&mut ws_write, &mut ws_read, code, reason).await;
                                break;
                            }
                        }

                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                                .unwrap_or((close_code::NO_STATUS, String::new()));
                            debug!(code, %reason, "WebSocket closed by remote");
                            // Flushes the queued close reply
                            let _ = ws_write.close().await;
                            self.finish(code, reason);
                            break;
                        }

                        Some(Ok(Message::Text(text))) => {
                            warn!(bytes = text.len(), "Ignoring text message");
                        }

                        Some(Err(e)) => {
                            self.fail(e.into());
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            self.finish(close_code::ABNORMAL, String::new());
                            break;
                        }

                        // Ignore protocol-level Ping, Pong, Frame
                        Some(Ok(_)) => {}
                    }
                }

                // Commands from the handle
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(bytes)) => {
                            if let Err(e) = ws_write.send(Message::Binary(bytes.into())).await {
                                warn!(error = %e, "Failed to send frame");
                            }
                        }

                        Some(TransportCommand::Close { code, reason }) => {
                            heartbeat.cancel();
                            self.close_locally(&mut ws_write, &mut ws_read, code, reason).await;
                            break;
                        }

                        None => {
                            debug!("All transport handles dropped");
                            let _ = ws_write.close().await;
                            self.shared.status.set(ConnectionStatus::Closed);
                            break;
                        }
                    }
                }

                // Heartbeat
                () = sleep_until(ping_due.unwrap_or_else(Instant::now)), if ping_due.is_some() => {
                    heartbeat.fire(Instant::now());
                    trace!("ping");
                    let ping = encode_empty(FrameKind::Ping).to_vec();
                    if let Err(e) = ws_write.send(Message::Binary(ping.into())).await {
                        warn!(error = %e, "Failed to send ping");
                    }
                }

                // Inactivity watchdog
                _ = tick.tick() => self.check_idle(&watchdog),
            }
        }

        debug!(uri = %self.uri, "Event loop terminated");
    }

    /// Dials the endpoint while still honoring close requests and the watchdog.
    async fn connect(
        &mut self,
        command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
        watchdog: &Watchdog,
        tick: &mut Interval,
    ) -> Option<WsStream> {
        let dial =
            connect_async_tls_with_config(self.uri.clone(), None, false, self.connector.take());
        tokio::pin!(dial);

        loop {
            tokio::select! {
                result = &mut dial => {
                    return match result {
                        Ok((ws, _)) => Some(ws),
                        Err(e) => {
                            self.fail(e.into());
                            None
                        }
                    };
                }

                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Close { code, reason }) => {
                            debug!(code, "Close requested before socket opened");
                            self.finish(code, reason);
                            return None;
                        }
                        Some(TransportCommand::Send(_)) => {
                            warn!("Dropping frame sent before socket opened");
                        }
                        None => {
                            self.shared.status.set(ConnectionStatus::Closed);
                            return None;
                        }
                    }
                }

                _ = tick.tick() => self.check_idle(watchdog),
            }
        }
    }

    /// Decodes and dispatches one frame.
    ///
    /// Returns a close request when the frame demands one (KICK).
    fn handle_frame(
        &self,
        data: &[u8],
        heartbeat: &mut Heartbeat,
        watchdog: &mut Watchdog,
    ) -> Option<(u16, String)> {
        let frame = match decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                return None;
            }
        };

        let now = Instant::now();
        watchdog.touch(now);

        match frame.kind {
            FrameKind::Normal => {
                // Malformed envelopes are dropped without surfacing an error
                if let Ok(incoming) = from_slice::<Incoming>(&frame.body) {
                    trace!(id = ?incoming.id, event = ?incoming.event, "decode message");
                    self.emit(TransportEvent::Message(incoming));
                }
            }

            FrameKind::Pong => {
                if let Some(distance) = heartbeat.on_pong(now) {
                    let ms = u64::try_from(distance.as_millis()).unwrap_or(NO_DISTANCE - 1);
                    self.shared.distance_ms.store(ms, Ordering::Relaxed);
                    trace!(distance_ms = ms, "pong");
                }
            }

            FrameKind::Cookie => match from_slice::<Cookie>(&frame.body) {
                Ok(cookie) => {
                    trace!(key = %cookie.key, expires = cookie.expires, "receive cookie");
                    self.emit(TransportEvent::Cookie(cookie));
                }
                Err(e) => warn!(error = %e, "Dropping malformed cookie"),
            },

            FrameKind::Kick => {
                let kick = from_slice::<Kick>(&frame.body).unwrap_or_default();
                debug!(reason = %kick.reason, "receive kick");
                return Some((close_code::KICKED, kick.reason));
            }

            FrameKind::Ready => match from_slice::<Value>(&frame.body) {
                Ok(body) => {
                    trace!("session ready");
                    self.emit(TransportEvent::Ready(body));
                    heartbeat.arm(now);
                }
                Err(e) => warn!(error = %e, "Dropping malformed ready"),
            },

            FrameKind::Ping | FrameKind::Handshake => {
                trace!(kind = %frame.kind, "Ignoring server-bound frame");
            }
        }

        None
    }

    /// Sends a close frame and waits briefly for the peer's reply.
    async fn close_locally(
        &self,
        ws_write: &mut WsWrite,
        ws_read: &mut WsRead,
        code: u16,
        reason: String,
    ) {
        self.shared.status.set(ConnectionStatus::Closing);

        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: clamp_reason(&reason).into(),
        };
        if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "Close frame not sent");
        }

        let ack = async {
            while let Some(Ok(message)) = ws_read.next().await {
                if message.is_close() {
                    break;
                }
            }
        };
        if timeout(CLOSE_ACK_TIMEOUT, ack).await.is_err() {
            debug!(code, "Peer did not acknowledge close");
        }

        self.finish(code, reason);
    }

    fn check_idle(&self, watchdog: &Watchdog) {
        if let Some(idle) = watchdog.expired(Instant::now()) {
            let idle_ms = duration_ms(idle);
            let timeout_ms = duration_ms(watchdog.timeout());
            warn!(idle_ms, timeout_ms, "Connection inactive");
            self.emit(TransportEvent::Error(Error::inactive(idle_ms, timeout_ms)));
        }
    }

    /// Reports an I/O failure followed by an abnormal close.
    fn fail(&self, err: Error) {
        self.shared.status.set(ConnectionStatus::Closed);
        error!(error = %err, uri = %self.uri, "WebSocket error");
        self.emit(TransportEvent::Error(err));
        self.emit(TransportEvent::Close {
            code: close_code::ABNORMAL,
            reason: String::new(),
        });
    }

    fn finish(&self, code: u16, reason: String) {
        self.shared.status.set(ConnectionStatus::Closed);
        debug!(code, %reason, "Socket closed");
        self.emit(TransportEvent::Close { code, reason });
    }

    #[inline]
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds a TLS connector presenting the client certificate in `pem`.
fn tls_connector(pem: &str) -> Result<Connector> {
    let identity = Identity::from_pkcs8(pem.as_bytes(), pem.as_bytes())?;
    let tls = TlsConnector::builder().identity(identity).build()?;
    Ok(Connector::NativeTls(tls))
}

/// Truncates a close reason to the RFC 6455 limit on a char boundary.
fn clamp_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_owned();
    }

    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_owned()
}

#[inline]
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    #[test]
    fn test_close_codes() {
        assert!(!close_code::is_terminal(close_code::NORMAL));
        assert!(!close_code::is_terminal(close_code::ABNORMAL));
        assert!(!close_code::is_terminal(2999));
        assert!(close_code::is_terminal(close_code::LOCAL));
        assert!(close_code::is_terminal(close_code::KICKED));
    }

    #[test]
    fn test_clamp_reason() {
        assert_eq!(clamp_reason("bye"), "bye");

        let long = "é".repeat(100);
        let clamped = clamp_reason(&long);
        assert!(clamped.len() <= MAX_CLOSE_REASON);
        assert!(long.starts_with(&clamped));
    }

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert!(config.cert.is_none());
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_open_rejects_non_socket_scheme() {
        let uri = Url::parse("tcp://127.0.0.1:9000").expect("url");
        let err = Transport::open(&uri, TransportConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidUri { .. }));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let uri = Url::parse(&format!("ws://127.0.0.1:{port}")).expect("url");
        let (transport, mut events) =
            Transport::open(&uri, TransportConfig::default()).expect("open");
        assert_eq!(transport.status(), ConnectionStatus::Connecting);

        let first = events.recv().await.expect("event");
        assert!(matches!(first, TransportEvent::Error(_)));

        let second = events.recv().await.expect("event");
        assert!(matches!(
            second,
            TransportEvent::Close {
                code: close_code::ABNORMAL,
                ..
            }
        ));
        assert_eq!(transport.status(), ConnectionStatus::Closed);
        assert_eq!(transport.distance(), None);
    }

    #[tokio::test]
    async fn test_close_is_noop_once_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let uri = Url::parse(&format!("ws://127.0.0.1:{port}")).expect("url");
        let (transport, mut events) =
            Transport::open(&uri, TransportConfig::default()).expect("open");
        while events.recv().await.is_some() {}

        transport.close(close_code::NORMAL, "late");
        assert_eq!(transport.status(), ConnectionStatus::Closed);
    }
}
