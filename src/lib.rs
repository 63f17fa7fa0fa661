//! Bidirectional request/reply messaging for stateless microservices.
//!
//! taskwire runs a typed application schema, a mapping from task-type names
//! to asynchronous handlers, behind a persistent full-duplex WebSocket
//! stream, with a stateless HTTP request/response channel as an alternate
//! transport. Clients tag each request with a type and correlation id, await
//! the matching reply, and recover transparently from transport loss:
//! requests pending across a reconnect are re-dispatched on the new
//! transport. Servers compose user middleware into a dispatch chain, answer
//! on the originating connection, and can push out-of-band events to a
//! scoped set of connections.
//!
//! # Server
//!
//! ```rust,no_run
//! use serde_json::{json, Value};
//! use taskwire::{Schema, TaskError, WebSocketServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = Schema::new().register("ADD", |payload: Value| async move {
//!         let x = payload["x"].as_i64().unwrap_or(0);
//!         let y = payload["y"].as_i64().unwrap_or(0);
//!         Ok::<_, TaskError>(json!(x + y))
//!     });
//!
//!     let server = WebSocketServer::new(schema);
//!     server.listen("127.0.0.1:8080").await?;
//!     server.push("motd", json!("hello"), taskwire::PushScope::Broadcast).await;
//!     Ok(())
//! }
//! ```
//!
//! # Client
//!
//! ```rust,no_run
//! use serde_json::json;
//! use taskwire::{AsyncTaskClient, WebSocketClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WebSocketClient::new("ws://127.0.0.1:8080");
//!     let sum: i64 = client.call("ADD", json!({"x": 3, "y": 5})).await?;
//!     assert_eq!(sum, 8);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod observability;
pub mod port;
pub mod services;

// Public API exports
pub use application::{ConcurrencyPool, MiddlewareChain, PoolMiddleware, RequestProcessor, Schema};
pub use domain::{
    ErrReply, Message, OkReply, Push, Request, TaskError, TaskWireError, ABNORMAL_CLOSURE,
    GOING_AWAY, PING_TYPE, PROTOCOL_ERROR, SERVER_SHUTTING_OFF,
};
pub use port::{Healthcheck, Middleware, Next, TaskHandler};

#[cfg(feature = "client")]
pub use services::client::{AsyncTaskClient, ClientEvent, ClientOptions, Tolerance};

#[cfg(feature = "server")]
pub use services::server::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, PushScope, ServerEvent,
};

#[cfg(feature = "http-client")]
pub use adapter::HttpClient;

#[cfg(feature = "http-server")]
pub use adapter::HttpServer;

#[cfg(feature = "ws-client")]
pub use adapter::transport::websocket::client::PushSubscription;
#[cfg(feature = "ws-client")]
pub use adapter::WebSocketClient;

#[cfg(feature = "ws-server")]
pub use adapter::WebSocketServer;
