//! Transport adapter implementations

pub mod error;
pub mod transport;

#[cfg(feature = "http-client")]
pub use transport::http::client::HttpClient;

#[cfg(feature = "http-server")]
pub use transport::http::server::HttpServer;

#[cfg(feature = "ws-client")]
pub use transport::websocket::client::WebSocketClient;

#[cfg(feature = "ws-server")]
pub use transport::websocket::server::WebSocketServer;
