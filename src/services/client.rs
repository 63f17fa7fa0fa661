//! Client-side service surface: options, lifecycle events, dispatch trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::error::TaskWireError;

/// Timeout-tolerance settings for transport recycling.
///
/// Over each `interval`, the client counts dispatched requests and observed
/// timeouts. When the timeout ratio exceeds `ratio` at a window boundary the
/// transport is force-closed and rebuilt; otherwise the counters reset. This
/// keeps a wedged-but-open transport from swallowing traffic silently.
#[derive(Debug, Clone, PartialEq)]
pub struct Tolerance {
    pub ratio: f64,
    pub interval: Duration,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            ratio: 0.05,
            interval: Duration::from_secs(10),
        }
    }
}

/// Options for a [`WebSocketClient`](crate::adapter::WebSocketClient).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Do not connect on construction; the caller starts the lifecycle with
    /// `connect()`.
    pub no_server: bool,
    /// Backoff between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Deadline for a single transmission attempt of a request.
    pub timeout: Duration,
    /// Maximum transmissions per request before it fails with `Timeout`.
    pub attempts: u32,
    /// When set, rotate the transport every interval, draining the old one
    /// gracefully.
    pub drain_interval: Option<Duration>,
    pub tolerance: Tolerance,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            no_server: false,
            reconnect_interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(10_000),
            attempts: 3,
            drain_interval: None,
            tolerance: Tolerance::default(),
        }
    }
}

impl ClientOptions {
    pub fn no_server(mut self, no_server: bool) -> Self {
        self.no_server = no_server;
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = Some(interval);
        self
    }

    pub fn tolerance(mut self, ratio: f64, interval: Duration) -> Self {
        self.tolerance = Tolerance { ratio, interval };
        self
    }
}

/// Lifecycle and per-request notifications observable on a client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// First successful connection.
    Ready,
    /// A drain rotation began.
    Reconnecting,
    /// A reconnection attempt failed; another follows after the backoff.
    ReconnectFailed,
    /// A connection was reestablished after loss or rotation.
    Reconnected,
    /// The host closed the transport; reconnection follows.
    HostClosed,
    /// A transport or protocol fault.
    Error(String),
    /// A request was dispatched.
    Request { id: String, task_type: String },
    /// A request exhausted its transmission attempts.
    Timeout { id: String },
    /// A ping expired before the healthcheck answered.
    PingTimeout,
}

/// Generic dispatch surface shared by the WebSocket and HTTP clients.
#[async_trait]
pub trait AsyncTaskClient: Send + Sync {
    /// Send a request of `task_type` and await its reply payload.
    async fn dispatch(&self, task_type: &str, payload: Value) -> Result<Value, TaskWireError>;

    /// Dispatch and deserialize the reply payload into `T`.
    async fn call<T>(&self, task_type: &str, payload: Value) -> Result<T, TaskWireError>
    where
        T: DeserializeOwned + Send,
    {
        Ok(serde_json::from_value(
            self.dispatch(task_type, payload).await?,
        )?)
    }
}
