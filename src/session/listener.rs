//! Named listener registry.
//!
//! Each [`Listener`] is an independent fan-out target. Feature modules take
//! their own listener by name so that registering or removing handlers in
//! one never disturbs another. Every session event is broadcast to every
//! registered listener.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::broadcast;

// ============================================================================
// Constants
// ============================================================================

/// Name of the listener created with every session.
pub const DEFAULT_LISTENER: &str = "default";

/// Buffered events per broadcast subscriber before it lags.
const CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// SessionEvent
// ============================================================================

/// Event delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The server accepted the handshake.
    Ready(Value),
    /// The session closed for good (terminal close or retries exhausted).
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Unsolicited server push.
    Push {
        /// Event name.
        event: String,
        /// Payload.
        body: Value,
    },
}

impl SessionEvent {
    /// Name handlers are registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ready(_) => "ready",
            Self::Close { .. } => "close",
            Self::Push { event, .. } => event,
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Callback invoked for a named event.
pub type EventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Identifies one registered handler, for removal with [`Listener::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Clone)]
struct Registered {
    id: HandlerId,
    handler: EventHandler,
    once: bool,
}

struct ListenerInner {
    name: String,
    next_id: AtomicU64,
    handlers: Mutex<FxHashMap<String, Vec<Registered>>>,
    sender: broadcast::Sender<SessionEvent>,
}

/// An independent event fan-out target.
///
/// Clones share the same handlers and channel.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.inner.name)
            .field("subscribers", &self.inner.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

impl Listener {
    fn new(name: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ListenerInner {
                name: name.into(),
                next_id: AtomicU64::new(0),
                handlers: Mutex::new(FxHashMap::default()),
                sender,
            }),
        }
    }

    /// Registry name of this listener.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Registers `handler` for events named `event`.
    ///
    /// Use `"ready"` and `"close"` for session events, or a push event name.
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.insert(event.into(), Arc::new(handler), false)
    }

    /// Registers `handler` for the next event named `event` only.
    pub fn once<F>(&self, event: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.insert(event.into(), Arc::new(handler), true)
    }

    /// Removes the handler registered as `id`.
    ///
    /// Returns `false` if it was already removed or has fired as a `once`.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.lock();
        for registered in handlers.values_mut() {
            if let Some(index) = registered.iter().position(|entry| entry.id == id) {
                registered.remove(index);
                return true;
            }
        }
        false
    }

    /// Removes every handler for `event`.
    pub fn off_all(&self, event: &str) {
        self.inner.handlers.lock().remove(event);
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.inner.handlers.lock().clear();
    }

    /// Returns a receiver for every event delivered to this listener.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.sender.subscribe()
    }

    /// Delivers `event` to matching handlers and subscribers.
    ///
    /// Handlers run without the handler lock held, so they may register or
    /// remove handlers themselves.
    pub(crate) fn emit(&self, event: &SessionEvent) {
        let handlers = {
            let mut handlers = self.inner.handlers.lock();
            match handlers.get_mut(event.name()) {
                Some(registered) => {
                    let matched = registered.clone();
                    // One-shot handlers are gone before any handler runs
                    registered.retain(|entry| !entry.once);
                    matched
                }
                None => Vec::new(),
            }
        };
        for registered in &handlers {
            (registered.handler)(event);
        }

        // No subscribers is not an error
        let _ = self.inner.sender.send(event.clone());
    }

    fn insert(&self, event: String, handler: EventHandler, once: bool) -> HandlerId {
        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .handlers
            .lock()
            .entry(event)
            .or_default()
            .push(Registered { id, handler, once });
        id
    }
}

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Name → [`Listener`] map owned by a session.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<FxHashMap<String, Listener>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        f.debug_set().entries(listeners.keys()).finish()
    }
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the listener named `name`, creating it if needed.
    pub fn register(&self, name: &str) -> Listener {
        self.listeners
            .lock()
            .entry(name.to_owned())
            .or_insert_with(|| Listener::new(name))
            .clone()
    }

    /// Removes the listener named `name`.
    ///
    /// Existing handles keep working but stop receiving session events.
    pub fn unregister(&self, name: &str) -> Option<Listener> {
        self.listeners.lock().remove(name)
    }

    /// Returns `true` if a listener named `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.listeners.lock().contains_key(name)
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Returns `true` if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Delivers `event` to every registered listener.
    ///
    /// The registry lock is released before any handler runs.
    pub fn broadcast(&self, event: &SessionEvent) {
        let targets: Vec<Listener> = self.listeners.lock().values().cloned().collect();
        for target in &targets {
            target.emit(event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    fn counter(listener: &Listener, event: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        listener.on(event, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_event_names() {
        assert_eq!(SessionEvent::Ready(Value::Null).name(), "ready");
        assert_eq!(
            SessionEvent::Close {
                code: 3000,
                reason: String::new()
            }
            .name(),
            "close"
        );
        assert_eq!(
            SessionEvent::Push {
                event: "chat.message".into(),
                body: Value::Null
            }
            .name(),
            "chat.message"
        );
    }

    #[test]
    fn test_register_returns_same_target() {
        let registry = ListenerRegistry::new();
        let first = registry.register("chat");
        let second = registry.register("chat");

        assert!(Arc::ptr_eq(&first.inner, &second.inner));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_broadcast_reaches_every_listener() {
        let registry = ListenerRegistry::new();
        let chat = registry.register("chat");
        let feed = registry.register("feed");
        let chat_count = counter(&chat, "ready");
        let feed_count = counter(&feed, "ready");

        registry.broadcast(&SessionEvent::Ready(json!({})));

        assert_eq!(chat_count.load(Ordering::SeqCst), 1);
        assert_eq!(feed_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handlers_filtered_by_name() {
        let registry = ListenerRegistry::new();
        let listener = registry.register(DEFAULT_LISTENER);
        let pushes = counter(&listener, "chat.message");
        let closes = counter(&listener, "close");

        registry.broadcast(&SessionEvent::Push {
            event: "chat.message".into(),
            body: json!("hi"),
        });

        assert_eq!(pushes.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let registry = ListenerRegistry::new();
        let chat = registry.register("chat");
        let count = counter(&chat, "ready");

        assert!(registry.unregister("chat").is_some());
        assert!(!registry.contains("chat"));

        registry.broadcast(&SessionEvent::Ready(Value::Null));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_off_removes_handlers() {
        let registry = ListenerRegistry::new();
        let listener = registry.register("a");
        let count = counter(&listener, "ready");
        listener.off_all("ready");

        registry.broadcast(&SessionEvent::Ready(Value::Null));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_off_removes_one_handler() {
        let registry = ListenerRegistry::new();
        let listener = registry.register("a");
        let kept = counter(&listener, "ready");
        let removed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&removed);
        let id = listener.on("ready", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(listener.off(id));
        assert!(!listener.off(id));

        registry.broadcast(&SessionEvent::Ready(Value::Null));
        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let registry = ListenerRegistry::new();
        let listener = registry.register("a");
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = listener.once("ready", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        registry.broadcast(&SessionEvent::Ready(Value::Null));
        registry.broadcast(&SessionEvent::Ready(Value::Null));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!listener.off(id));
    }

    #[test]
    fn test_once_handler_may_reenter_listener() {
        let registry = ListenerRegistry::new();
        let listener = registry.register("a");
        let count = Arc::new(AtomicUsize::new(0));
        let inner = listener.clone();
        let seen = Arc::clone(&count);
        listener.once("close", move |_| {
            let seen = Arc::clone(&seen);
            inner.on("close", move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        });

        let close = SessionEvent::Close {
            code: 1000,
            reason: String::new(),
        };
        registry.broadcast(&close);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        registry.broadcast(&close);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_reenter_registry() {
        let registry = Arc::new(ListenerRegistry::new());
        let listener = registry.register("a");
        let inner = Arc::clone(&registry);
        listener.on("close", move |_| {
            inner.unregister("a");
            inner.register("b");
        });

        registry.broadcast(&SessionEvent::Close {
            code: 3001,
            reason: "kicked".into(),
        });

        assert!(!registry.contains("a"));
        assert!(registry.contains("b"));
    }

    #[tokio::test]
    async fn test_subscribe_receives_events() {
        let registry = ListenerRegistry::new();
        let listener = registry.register("stream");
        let mut rx = listener.subscribe();

        registry.broadcast(&SessionEvent::Push {
            event: "tick".into(),
            body: json!(1),
        });

        let event = rx.recv().await.expect("event");
        assert_eq!(
            event,
            SessionEvent::Push {
                event: "tick".into(),
                body: json!(1)
            }
        );
    }
}
