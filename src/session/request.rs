//! Request correlation and deduplication.
//!
//! Every in-flight request has two entries:
//!
//! - a pending entry (id → response sender), removed when the response
//!   arrives or the timeout fires
//! - an asking entry (dedup key → shared result), removed when the
//!   request settles either way
//!
//! Both outlive transport replacement; only settlement removes them.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Default time a request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// RequestOptions
// ============================================================================

/// Deduplication key selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutexKey {
    /// Deduplicate by route name.
    Route,
    /// Deduplicate by a caller-chosen token.
    Named(String),
}

impl MutexKey {
    /// Resolves the dedup key for `route`.
    #[inline]
    #[must_use]
    pub fn key<'a>(&'a self, route: &'a str) -> &'a str {
        match self {
            Self::Route => route,
            Self::Named(token) => token,
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Reuse an in-flight request with the same key instead of sending.
    pub mutex: Option<MutexKey>,
}

impl RequestOptions {
    /// Deduplicate by route.
    #[inline]
    #[must_use]
    pub fn mutex() -> Self {
        Self {
            mutex: Some(MutexKey::Route),
        }
    }

    /// Deduplicate by `token`.
    #[inline]
    #[must_use]
    pub fn mutex_key(token: impl Into<String>) -> Self {
        Self {
            mutex: Some(MutexKey::Named(token.into())),
        }
    }
}

// ============================================================================
// ResponseFuture
// ============================================================================

/// Awaitable response to a request.
///
/// Clones resolve to the same outcome; deduplicated callers receive clones
/// of the first request's future.
#[derive(Clone)]
pub struct ResponseFuture {
    id: RequestId,
    timeout_ms: u64,
    settled: Shared<BoxFuture<'static, Option<Value>>>,
}

impl ResponseFuture {
    /// Correlation id of the underlying request.
    #[inline]
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("id", &self.id)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let (id, timeout_ms) = (this.id, this.timeout_ms);
        Pin::new(&mut this.settled)
            .poll(cx)
            .map(|body| body.ok_or_else(|| Error::request_timeout(id, timeout_ms)))
    }
}

// ============================================================================
// Requests
// ============================================================================

/// An in-flight request tracked for deduplication.
#[derive(Debug)]
pub struct AskingEntry {
    /// Correlation id.
    pub id: RequestId,
    /// Dedup key (mutex token, or the route).
    pub key: String,
    /// Route requested.
    pub route: String,
    /// Parameters sent.
    pub params: Value,
    /// Shared result.
    pub response: ResponseFuture,
}

/// Pending and asking tables for one session.
#[derive(Default)]
pub struct Requests {
    pending: Mutex<FxHashMap<RequestId, oneshot::Sender<Value>>>,
    asking: Mutex<Vec<AskingEntry>>,
}

impl fmt::Debug for Requests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requests")
            .field("pending", &self.pending_count())
            .field("asking", &self.asking_count())
            .finish()
    }
}

impl Requests {
    /// Creates empty tables.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the in-flight result recorded under `key`, if any.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<ResponseFuture> {
        self.asking
            .lock()
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.response.clone())
    }

    /// Records a request and arms its timeout.
    ///
    /// The timeout runs on its own task whether or not the returned future
    /// is polled. Must be called within a tokio runtime.
    pub fn register(
        self: &Arc<Self>,
        id: RequestId,
        key: String,
        route: &str,
        params: Value,
        request_timeout: Duration,
    ) -> ResponseFuture {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        // Held until the entry is recorded so the timer cannot settle first
        let mut asking = self.asking.lock();

        let requests = Arc::clone(self);
        let timer = tokio::spawn(async move {
            let body = match timeout(request_timeout, rx).await {
                Ok(Ok(body)) => Some(body),
                Ok(Err(_)) => None,
                Err(_) => {
                    debug!(request_id = %id, "Request timed out");
                    None
                }
            };
            requests.settle(id);
            body
        });

        let response = ResponseFuture {
            id,
            timeout_ms: u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX),
            settled: async move { timer.await.ok().flatten() }.boxed().shared(),
        };

        asking.push(AskingEntry {
            id,
            key,
            route: route.to_owned(),
            params,
            response: response.clone(),
        });

        response
    }

    /// Delivers `body` to the request with `id`.
    ///
    /// Returns `false` if no such request is pending.
    pub fn resolve(&self, id: RequestId, body: Value) -> bool {
        let Some(tx) = self.pending.lock().remove(&id) else {
            return false;
        };
        // Not joinable once answered, even before the timer task wakes
        self.asking.lock().retain(|entry| entry.id != id);

        // Receiver gone means the timer already fired
        tx.send(body).is_ok()
    }

    /// Drops both entries for `id`.
    ///
    /// A request dropped before its response settles as a timeout.
    pub fn settle(&self, id: RequestId) {
        self.pending.lock().remove(&id);
        self.asking.lock().retain(|entry| entry.id != id);
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of requests tracked for deduplication.
    #[must_use]
    pub fn asking_count(&self) -> usize {
        self.asking.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    const LONG: Duration = Duration::from_secs(30);

    fn register(requests: &Arc<Requests>, id: u32, key: &str, wait: Duration) -> ResponseFuture {
        requests.register(RequestId::new(id), key.to_owned(), key, json!({}), wait)
    }

    #[test]
    fn test_mutex_key_resolution() {
        assert_eq!(MutexKey::Route.key("user.profile"), "user.profile");
        assert_eq!(MutexKey::Named("lock".into()).key("user.profile"), "lock");
        assert_eq!(RequestOptions::default().mutex, None);
        assert_eq!(RequestOptions::mutex().mutex, Some(MutexKey::Route));
    }

    #[tokio::test]
    async fn test_resolve_delivers_body_and_clears_tables() {
        let requests = Arc::new(Requests::new());
        let response = register(&requests, 1, "r", LONG);
        assert_eq!(requests.pending_count(), 1);
        assert_eq!(requests.asking_count(), 1);

        assert!(requests.resolve(RequestId::new(1), json!({ "ok": true })));
        let body = response.await.expect("response");

        assert_eq!(body, json!({ "ok": true }));
        assert_eq!(requests.pending_count(), 0);
        assert_eq!(requests.asking_count(), 0);
    }

    #[tokio::test]
    async fn test_find_returns_shared_result() {
        let requests = Arc::new(Requests::new());
        let first = register(&requests, 1, "r", LONG);
        let again = requests.find("r").expect("in flight");
        assert_eq!(again.id(), first.id());

        requests.resolve(RequestId::new(1), json!(7));
        assert_eq!(first.await.expect("first"), json!(7));
        assert_eq!(again.await.expect("again"), json!(7));
        assert!(requests.find("r").is_none());
    }

    #[tokio::test]
    async fn test_resolved_request_is_not_joinable() {
        let requests = Arc::new(Requests::new());
        let _first = register(&requests, 1, "r", LONG);

        assert!(requests.resolve(RequestId::new(1), json!("old")));

        assert!(requests.find("r").is_none());
        assert_eq!(requests.asking_count(), 0);
        assert_eq!(requests.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_id_is_ignored() {
        let requests = Arc::new(Requests::new());
        assert!(!requests.resolve(RequestId::new(99), Value::Null));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_and_clears_tables() {
        let requests = Arc::new(Requests::new());
        let response = register(&requests, 4, "slow", Duration::from_secs(5));

        let err = response.await.unwrap_err();
        assert!(matches!(
            err,
            Error::RequestTimeout {
                timeout_ms: 5000,
                ..
            }
        ));
        assert_eq!(requests.pending_count(), 0);
        assert_eq!(requests.asking_count(), 0);
        assert!(!requests.resolve(RequestId::new(4), Value::Null));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_runs_without_polling() {
        let requests = Arc::new(Requests::new());
        let _response = register(&requests, 2, "idle", Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(requests.pending_count(), 0);
        assert_eq!(requests.asking_count(), 0);
    }

    #[tokio::test]
    async fn test_settle_before_response_rejects() {
        let requests = Arc::new(Requests::new());
        let response = register(&requests, 3, "dropped", LONG);
        requests.settle(RequestId::new(3));

        assert!(response.await.unwrap_err().is_timeout());
    }
}
