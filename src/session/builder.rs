//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and creating [`Session`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use tsingtao::Session;
//!
//! # fn example() -> tsingtao::Result<()> {
//! let session = Session::builder()
//!     .version("1.0")
//!     .timeout(Duration::from_secs(10))
//!     .max_retries(3)
//!     .build("wss://chat.example.com/socket")?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_TIMEOUT, TransportConfig};

use super::cookie::{CookieJar, MemoryCookieJar};
use super::core::Session;
use super::request::DEFAULT_REQUEST_TIMEOUT;

// ============================================================================
// Constants
// ============================================================================

/// Default delay before reconnecting after a transient close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// Options
// ============================================================================

/// Supplies extra handshake metadata on every connect.
pub type HeadersProvider = Arc<dyn Fn() -> HashMap<String, String> + Send + Sync>;

/// Validated session configuration.
#[derive(Clone)]
pub struct Options {
    /// Client protocol version sent in the handshake.
    pub version: String,
    /// Inactivity before the watchdog declares the connection dead.
    pub timeout: Duration,
    /// PEM client certificate bundle for `wss://`.
    pub cert: Option<String>,
    /// Transient-close retry budget. `None` or `0` disables retry.
    pub max_retries: Option<u32>,
    /// Handshake headers callback.
    pub headers: Option<HeadersProvider>,
    /// Cookie persistence.
    pub cookie_jar: Arc<dyn CookieJar>,
    /// Time a request waits for its response.
    pub request_timeout: Duration,
    /// Delay before a reconnect attempt.
    pub reconnect_delay: Duration,
    /// Delay between a READY/PONG and the next PING.
    pub heartbeat_interval: Duration,
}

impl Options {
    /// Transport settings derived from these options.
    #[must_use]
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            cert: self.cert.clone(),
            timeout: self.timeout,
            heartbeat_interval: self.heartbeat_interval,
        }
    }

    /// Evaluates the headers callback, or returns an empty map.
    #[must_use]
    pub fn handshake_headers(&self) -> HashMap<String, String> {
        self.headers
            .as_ref()
            .map(|provider| provider())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("version", &self.version)
            .field("timeout", &self.timeout)
            .field("cert", &self.cert.as_ref().map(|_| "<pem>"))
            .field("max_retries", &self.max_retries)
            .field("headers", &self.headers.is_some())
            .field("request_timeout", &self.request_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Clone)]
pub struct SessionBuilder {
    version: Option<String>,
    timeout: Duration,
    cert: Option<String>,
    max_retries: Option<u32>,
    headers: Option<HeadersProvider>,
    cookie_jar: Option<Arc<dyn CookieJar>>,
    request_timeout: Duration,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            version: None,
            timeout: DEFAULT_TIMEOUT,
            cert: None,
            max_retries: None,
            headers: None,
            cookie_jar: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("version", &self.version)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a builder with default timings and no version.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the protocol version sent in the handshake. Required.
    #[inline]
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the inactivity timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the PEM client certificate bundle (chain plus PKCS#8 key).
    #[inline]
    #[must_use]
    pub fn cert(mut self, pem: impl Into<String>) -> Self {
        self.cert = Some(pem.into());
        self
    }

    /// Sets the transient-close retry budget.
    ///
    /// `0` disables retry, same as never calling this.
    #[inline]
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the handshake headers callback, evaluated on every connect.
    #[inline]
    #[must_use]
    pub fn headers<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> HashMap<String, String> + Send + Sync + 'static,
    {
        self.headers = Some(Arc::new(provider));
        self
    }

    /// Sets cookie persistence. Defaults to a fresh [`MemoryCookieJar`].
    #[inline]
    #[must_use]
    pub fn cookie_jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// Sets how long a request waits for its response.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the delay before a reconnect attempt.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the delay between a READY/PONG and the next PING.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Builds the session with validation. Does not connect.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if version is missing or a duration is zero
    /// - [`Error::InvalidUri`] if `uri` does not parse
    pub fn build(self, uri: impl AsRef<str>) -> Result<Session> {
        let uri = uri.as_ref();
        Url::parse(uri).map_err(|e| Error::invalid_uri(uri, e.to_string()))?;

        let options = self.validate()?;
        Ok(Session::new(uri.to_owned(), options))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionBuilder {
    fn validate(self) -> Result<Options> {
        let version = self
            .version
            .filter(|version| !version.is_empty())
            .ok_or_else(|| {
                Error::config(
                    "Protocol version is required. Use .version() to set it.\n\
                     Example: Session::builder().version(\"1.0\")",
                )
            })?;

        for (name, value) in [
            ("timeout", self.timeout),
            ("request_timeout", self.request_timeout),
            ("heartbeat_interval", self.heartbeat_interval),
        ] {
            if value.is_zero() {
                return Err(Error::config(format!("{name} must be non-zero")));
            }
        }

        Ok(Options {
            version,
            timeout: self.timeout,
            cert: self.cert,
            max_retries: self.max_retries,
            headers: self.headers,
            cookie_jar: self
                .cookie_jar
                .unwrap_or_else(|| Arc::new(MemoryCookieJar::new())),
            request_timeout: self.request_timeout,
            reconnect_delay: self.reconnect_delay,
            heartbeat_interval: self.heartbeat_interval,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
