//! Error types for client adapters

use std::io;

use thiserror::Error;

use crate::domain::error::TaskWireError;

/// Error type for the HTTP client adapter
#[derive(Error, Debug)]
#[cfg(feature = "http-client")]
pub enum HttpClientError {
    /// Reqwest client error
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// IO error during HTTP operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error with an HTTP response
    #[error("response error: {status} - {message}")]
    Response { status: u16, message: String },
}

/// Error type for the WebSocket client adapter
#[derive(Error, Debug)]
#[cfg(feature = "ws-client")]
pub enum WebSocketClientError {
    /// WebSocket connection error
    #[error("WebSocket connection error: {0}")]
    Connection(String),

    /// WebSocket message error
    #[error("WebSocket message error: {0}")]
    Message(String),

    /// IO error during WebSocket operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Connection closed
    #[error("connection closed")]
    Closed,
}

#[cfg(feature = "http-client")]
impl From<HttpClientError> for TaskWireError {
    fn from(error: HttpClientError) -> Self {
        match error {
            HttpClientError::Reqwest(e) => TaskWireError::Transport(e.to_string()),
            HttpClientError::Io(e) => TaskWireError::Io(e),
            HttpClientError::Response { status, message } => {
                TaskWireError::Transport(format!("HTTP {status}: {message}"))
            }
        }
    }
}

#[cfg(feature = "ws-client")]
impl From<WebSocketClientError> for TaskWireError {
    fn from(error: WebSocketClientError) -> Self {
        match error {
            WebSocketClientError::Connection(msg) => TaskWireError::Transport(msg),
            WebSocketClientError::Message(msg) => TaskWireError::Transport(msg),
            WebSocketClientError::Io(e) => TaskWireError::Io(e),
            WebSocketClientError::Closed => TaskWireError::Closed,
        }
    }
}
