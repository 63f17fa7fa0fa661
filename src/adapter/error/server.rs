//! Error types for server adapters

use std::io;

use thiserror::Error;

use crate::domain::error::TaskWireError;

/// Error type for the HTTP server adapter
#[derive(Error, Debug)]
#[cfg(feature = "http-server")]
pub enum HttpServerError {
    /// IO error while binding or serving
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error while serving
    #[error("server error: {0}")]
    Server(String),
}

/// Error type for the WebSocket server adapter
#[derive(Error, Debug)]
#[cfg(feature = "ws-server")]
pub enum WebSocketServerError {
    /// Error establishing or maintaining a connection
    #[error("WebSocket connection error: {0}")]
    Connection(String),

    /// IO error while binding or accepting
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error while serving
    #[error("server error: {0}")]
    Server(String),
}

#[cfg(feature = "http-server")]
impl From<HttpServerError> for TaskWireError {
    fn from(error: HttpServerError) -> Self {
        match error {
            HttpServerError::Io(e) => TaskWireError::Io(e),
            HttpServerError::Server(msg) => TaskWireError::Transport(msg),
        }
    }
}

#[cfg(feature = "ws-server")]
impl From<WebSocketServerError> for TaskWireError {
    fn from(error: WebSocketServerError) -> Self {
        match error {
            WebSocketServerError::Connection(msg) => TaskWireError::Transport(msg),
            WebSocketServerError::Io(e) => TaskWireError::Io(e),
            WebSocketServerError::Server(msg) => TaskWireError::Transport(msg),
        }
    }
}
