//! Transport protocol adapter implementations

#[cfg(any(feature = "http-client", feature = "http-server"))]
pub mod http;

#[cfg(any(feature = "ws-client", feature = "ws-server"))]
pub mod websocket;

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A JSON text frame.
    Text(String),
    /// Close the connection with the given close code; the writer sends the
    /// close frame and stops.
    Close(u16),
}
