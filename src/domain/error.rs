use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error type for taskwire operations
#[derive(Error, Debug)]
pub enum TaskWireError {
    /// The server answered the request with an ERR reply
    #[error("task failed: {0}")]
    Task(TaskError),

    /// Every transmission attempt expired without a matching reply
    #[error("request timed out")]
    Timeout,

    /// The endpoint was closed before or during the operation
    #[error("endpoint is closed")]
    Closed,

    /// The concurrency pool queue is at capacity
    #[error("concurrency pool queue is full")]
    QueueFull,

    /// An inbound frame could not be decoded
    #[error("malformed frame: {0}")]
    BadFrame(String),

    /// The underlying transport failed
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON encode error outside the framing path
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// The error value carried by an ERR reply.
///
/// Handlers fail with a `TaskError`; it travels as the `error` field of the
/// ERR frame. `code`, when present and a valid HTTP status, doubles as the
/// response status on the HTTP transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            data: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set `code` only if none was supplied by the handler.
    pub fn or_code(mut self, code: u16) -> Self {
        self.code.get_or_insert(code);
        self
    }

    /// The HTTP status this error maps to. Only codes in the valid status
    /// range are honored; everything else is a 500.
    pub fn http_status(&self) -> u16 {
        match self.code {
            Some(code) if (100..=599).contains(&code) => code,
            _ => 500,
        }
    }

    /// Serialize into the wire `error` value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.message.clone()))
    }

    /// Recover a `TaskError` from an arbitrary wire `error` value. Values
    /// that do not match the `{message, code?, data?}` shape are preserved
    /// verbatim under `data` with a stringified `message`.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<TaskError>(value.clone()) {
            Ok(error) => error,
            Err(_) => {
                let message = match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Self {
                    message,
                    code: None,
                    data: Some(value),
                }
            }
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TaskError {}
