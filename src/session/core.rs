//! Session core: connect, retry, correlation and fan-out.
//!
//! A [`Session`] owns at most one [`Transport`] at a time. Each transport
//! gets an event pump task that feeds its events back into the session;
//! every close discards the transport, and transient closes schedule a
//! fresh one after the reconnect delay.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::RequestIdAllocator;
use crate::protocol::{Cookie, FrameKind, Handshake, Incoming, Notification, Request};
use crate::transport::{ConnectionStatus, Transport, TransportEvent, TransportEvents, close_code};

use super::builder::{Options, SessionBuilder};
use super::lifecycle::{CloseDecision, Lifecycle, LifecycleState};
use super::listener::{DEFAULT_LISTENER, Listener, ListenerRegistry, SessionEvent};
use super::request::{RequestOptions, Requests, ResponseFuture};

// ============================================================================
// Constants
// ============================================================================

/// Cookie replayed in every handshake.
const SESSION_COOKIE: &str = "session";

/// Schemes accepted but not dialed.
const UNSUPPORTED_SCHEMES: [&str; 5] = ["tcp", "udp", "http", "https", "quic"];

// ============================================================================
// Session
// ============================================================================

/// Transport currently owned by the session.
struct ActiveTransport {
    generation: u64,
    transport: Transport,
}

/// Shared session state.
struct SessionInner {
    options: Options,
    uri: Mutex<String>,
    active: Mutex<Option<ActiveTransport>>,
    generation: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
    ids: RequestIdAllocator,
    requests: Arc<Requests>,
    listeners: ListenerRegistry,
}

/// One logical connection to an endpoint.
///
/// Cloning yields another handle to the same session. Background tasks hold
/// only weak references: once every handle is dropped the event pump stops
/// and the transport shuts down.
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use tsingtao::{SessionEvent, Session};
///
/// # async fn example() -> tsingtao::Result<()> {
/// let session = Session::builder()
///     .version("1.0")
///     .max_retries(3)
///     .build("ws://127.0.0.1:3010")?;
///
/// session.default_listener().on("ready", |event| {
///     if let SessionEvent::Ready(body) = event {
///         println!("ready: {body}");
///     }
/// });
/// session.connect()?;
///
/// // Later, once open:
/// if let Some(response) = session.request("user.profile", json!({ "uid": 7 })) {
///     let profile = response.await?;
///     println!("{profile}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("uri", &self.uri())
            .field("status", &self.status())
            .field("lifecycle", &self.lifecycle())
            .field("retries", &self.retries())
            .field("listeners", &self.inner.listeners)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Construction
// ============================================================================

impl Session {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub(crate) fn new(uri: String, options: Options) -> Self {
        let listeners = ListenerRegistry::new();
        listeners.register(DEFAULT_LISTENER);

        let lifecycle = Lifecycle::new(options.max_retries);
        Self {
            inner: Arc::new(SessionInner {
                options,
                uri: Mutex::new(uri),
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
                lifecycle: Mutex::new(lifecycle),
                ids: RequestIdAllocator::new(),
                requests: Arc::new(Requests::new()),
                listeners,
            }),
        }
    }
}

// ============================================================================
// Session - Connection
// ============================================================================

impl Session {
    /// Starts connecting to the stored URI.
    ///
    /// No-op if a transport already exists. Connection failures surface as
    /// listener events, not as errors here. Must be called within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUri`] if the URI does not parse or its scheme is unknown
    /// - [`Error::Tls`] if the client certificate cannot be loaded
    pub fn connect(&self) -> Result<()> {
        self.inner.connect()
    }

    /// Replaces the stored URI, then connects.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub fn connect_to(&self, uri: impl Into<String>) -> Result<()> {
        *self.inner.uri.lock() = uri.into();
        self.inner.connect()
    }

    /// Closes the connection with code 3000. Never retried.
    ///
    /// No-op unless the connection is open.
    pub fn close(&self, reason: Option<&str>) {
        if let Some(transport) = self.inner.open_transport() {
            info!(reason = reason.unwrap_or_default(), "Closing session");
            transport.close(close_code::LOCAL, reason.unwrap_or_default());
        }
    }

    /// Status of the current transport, `UNKNOWN` when there is none.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner
            .active
            .lock()
            .as_ref()
            .map_or(ConnectionStatus::Unknown, |active| active.transport.status())
    }

    /// Last measured PING→PONG round trip on the current transport.
    #[must_use]
    pub fn distance(&self) -> Option<Duration> {
        self.inner.transport()?.distance()
    }

    /// Consecutive transient closes since the last READY.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.inner.lifecycle.lock().retries()
    }

    /// Where the session is in its connect/retry cycle.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        self.inner.lifecycle.lock().state()
    }

    /// Endpoint URI used by the next connect.
    #[must_use]
    pub fn uri(&self) -> String {
        self.inner.uri.lock().clone()
    }
}

// ============================================================================
// Session - Messaging
// ============================================================================

impl Session {
    /// Sends a request and returns its pending response.
    ///
    /// Returns `None` if the connection is not open; nothing is queued.
    pub fn request(&self, route: &str, params: Value) -> Option<ResponseFuture> {
        self.request_with(route, params, RequestOptions::default())
    }

    /// Sends a request with options.
    ///
    /// With a mutex key, an in-flight request recorded under the same key
    /// is returned instead of sending a new one.
    pub fn request_with(
        &self,
        route: &str,
        params: Value,
        options: RequestOptions,
    ) -> Option<ResponseFuture> {
        let transport = self.inner.open_transport()?;
        let requests = &self.inner.requests;

        let key = options.mutex.as_ref().map_or(route, |mutex| mutex.key(route));
        if options.mutex.is_some()
            && let Some(existing) = requests.find(key)
        {
            debug!(%route, key, request_id = %existing.id(), "Joining in-flight request");
            return Some(existing);
        }

        let id = self.inner.ids.next_id();
        let response = requests.register(
            id,
            key.to_owned(),
            route,
            params.clone(),
            self.inner.options.request_timeout,
        );

        if let Err(e) = transport.send_json(&Request::new(id, route, &params), FrameKind::Normal) {
            warn!(error = %e, %route, request_id = %id, "Request not sent");
            requests.settle(id);
            return None;
        }

        trace!(%route, request_id = %id, "request");
        Some(response)
    }

    /// Sends a fire-and-forget notification.
    ///
    /// Returns `false` if the connection is not open or the send failed.
    pub fn notify(&self, route: &str, params: Value) -> bool {
        let Some(transport) = self.inner.open_transport() else {
            return false;
        };

        match transport.send_json(&Notification::new(route, &params), FrameKind::Normal) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, %route, "Notification not sent");
                false
            }
        }
    }

    /// Requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.requests.pending_count()
    }

    /// Requests tracked for deduplication.
    #[must_use]
    pub fn asking_count(&self) -> usize {
        self.inner.requests.asking_count()
    }
}

// ============================================================================
// Session - Listeners
// ============================================================================

impl Session {
    /// Returns the listener named `name`, creating it if needed.
    pub fn listener(&self, name: &str) -> Listener {
        self.inner.listeners.register(name)
    }

    /// Returns the listener created with the session.
    pub fn default_listener(&self) -> Listener {
        self.listener(DEFAULT_LISTENER)
    }

    /// Removes the listener named `name`.
    ///
    /// Returns `false` if no such listener was registered.
    pub fn remlistener(&self, name: &str) -> bool {
        self.inner.listeners.unregister(name).is_some()
    }

    /// Returns `true` if a listener named `name` is registered.
    #[must_use]
    pub fn has_listener(&self, name: &str) -> bool {
        self.inner.listeners.contains(name)
    }
}

// ============================================================================
// SessionInner
// ============================================================================

impl SessionInner {
    fn connect(self: &Arc<Self>) -> Result<()> {
        let mut active = self.active.lock();
        if active.is_some() {
            debug!("Transport already present, connect ignored");
            return Ok(());
        }

        let uri = self.uri.lock().clone();
        let url = Url::parse(&uri).map_err(|e| Error::invalid_uri(&uri, e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => {}
            scheme if UNSUPPORTED_SCHEMES.contains(&scheme) => {
                warn!(%uri, scheme, "Transport scheme not supported, nothing dialed");
                return Ok(());
            }
            scheme => {
                return Err(Error::invalid_uri(&uri, format!("unknown scheme {scheme}")));
            }
        }

        let (transport, events) = Transport::open(&url, self.options.transport_config())?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *active = Some(ActiveTransport {
            generation,
            transport,
        });
        drop(active);

        self.lifecycle.lock().on_connect();
        info!(%uri, generation, "Connecting");
        tokio::spawn(pump(Arc::downgrade(self), generation, events));
        Ok(())
    }

    fn transport(&self) -> Option<Transport> {
        self.active
            .lock()
            .as_ref()
            .map(|active| active.transport.clone())
    }

    fn open_transport(&self) -> Option<Transport> {
        self.transport()
            .filter(|transport| transport.status().is_open())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    fn handle_event(self: &Arc<Self>, generation: u64, event: TransportEvent) {
        if !self.is_current(generation) {
            trace!(generation, ?event, "Ignoring event from replaced transport");
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(incoming) => self.on_message(incoming),
            TransportEvent::Cookie(cookie) => self.on_cookie(cookie),
            TransportEvent::Ready(body) => self.on_ready(body),
            TransportEvent::Error(err) => self.on_error(&err),
            TransportEvent::Close { code, reason } => self.on_close(code, reason),
        }
    }

    fn on_open(&self) {
        let handshake = Handshake::new(
            self.options.version.as_str(),
            self.options.handshake_headers(),
            self.options.cookie_jar.get_cookie(SESSION_COOKIE),
        );

        if let Some(transport) = self.transport()
            && let Err(e) = transport.send_json(&handshake, FrameKind::Handshake)
        {
            warn!(error = %e, "Handshake not sent");
        }
    }

    fn on_message(&self, incoming: Incoming) {
        if let Some(id) = incoming.response_id() {
            if !self.requests.resolve(id, incoming.body) {
                debug!(request_id = %id, "Response for unknown or expired request");
            }
            return;
        }

        match incoming.event {
            Some(event) => {
                trace!(%event, "push");
                self.listeners.broadcast(&SessionEvent::Push {
                    event,
                    body: incoming.body,
                });
            }
            None => debug!("Dropping push without event name"),
        }
    }

    fn on_cookie(&self, cookie: Cookie) {
        self.options
            .cookie_jar
            .set_cookie(&cookie.key, cookie.value, cookie.expires);
    }

    fn on_ready(&self, body: Value) {
        self.lifecycle.lock().on_ready();
        info!("Session ready");
        self.listeners.broadcast(&SessionEvent::Ready(body));
    }

    fn on_error(&self, err: &Error) {
        error!(error = %err, "Transport error");
        if let Some(transport) = self.transport() {
            transport.close(close_code::NORMAL, err.to_string());
        }
    }

    fn on_close(self: &Arc<Self>, code: u16, reason: String) {
        let decision = self.lifecycle.lock().on_close(code);
        self.active.lock().take();

        match decision {
            CloseDecision::Retry { attempt } => {
                info!(code, %reason, attempt, "Connection lost, reconnecting");
                let session = Arc::downgrade(self);
                let delay = self.options.reconnect_delay;
                tokio::spawn(async move {
                    sleep(delay).await;
                    let Some(inner) = session.upgrade() else {
                        return;
                    };
                    if let Err(e) = inner.connect() {
                        error!(error = %e, "Reconnect failed");
                    }
                });
            }

            CloseDecision::Terminal | CloseDecision::GiveUp => {
                info!(code, %reason, ?decision, "Session closed");
                self.listeners
                    .broadcast(&SessionEvent::Close { code, reason });
            }
        }
    }
}

/// Feeds one transport's events into the session until either side ends.
async fn pump(session: Weak<SessionInner>, generation: u64, mut events: TransportEvents) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        inner.handle_event(generation, event);
    }
    trace!(generation, "Event pump stopped");
}

// ============================================================================
// Tests
// ============================================================================
