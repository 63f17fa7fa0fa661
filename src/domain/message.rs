//! Wire message model and JSON codec.
//!
//! Every frame is a JSON object tagged by its `type` field. `OK`, `ERR` and
//! `PUSH` are reserved tags; any other tag names a task type and decodes as a
//! [`Request`]. Fields the protocol does not know about are kept on decode
//! and written back on encode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::TaskWireError;

/// Reserved task type that routes to the server healthcheck.
pub const PING_TYPE: &str = "$PING";

/// Close code sent by a server that is shutting off; clients reconnect.
pub const SERVER_SHUTTING_OFF: u16 = 1000;
/// Close code for a deliberate, terminal goodbye.
pub const GOING_AWAY: u16 = 1001;
/// Close code used after an undecodable frame.
pub const PROTOCOL_ERROR: u16 = 1002;
/// Synthetic close code for a peer that vanished without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// A client-originated request, tagged with a task type and correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(skip)]
    pub task_type: String,
    pub id: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A successful reply, correlated by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OkReply {
    pub id: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A failed reply, correlated by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrReply {
    pub id: String,
    #[serde(default)]
    pub error: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A server-originated event; carries no id and expects no reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Push {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Request {
    pub fn new(task_type: impl Into<String>, id: impl Into<String>, payload: Value) -> Self {
        Self {
            task_type: task_type.into(),
            id: id.into(),
            payload,
            extra: Map::new(),
        }
    }
}

impl OkReply {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
            extra: Map::new(),
        }
    }
}

impl ErrReply {
    pub fn new(id: impl Into<String>, error: Value) -> Self {
        Self {
            id: id.into(),
            error,
            extra: Map::new(),
        }
    }
}

impl Push {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            extra: Map::new(),
        }
    }
}

/// Union of every frame the protocol exchanges.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Ok(OkReply),
    Err(ErrReply),
    Push(Push),
}

impl Message {
    /// The value of the frame's `type` tag.
    pub fn tag(&self) -> &str {
        match self {
            Message::Request(request) => &request.task_type,
            Message::Ok(_) => "OK",
            Message::Err(_) => "ERR",
            Message::Push(_) => "PUSH",
        }
    }

    /// Encode into a JSON object value.
    pub fn to_value(&self) -> Result<Value, TaskWireError> {
        let body = match self {
            Message::Request(request) => serde_json::to_value(request)?,
            Message::Ok(reply) => serde_json::to_value(reply)?,
            Message::Err(reply) => serde_json::to_value(reply)?,
            Message::Push(push) => serde_json::to_value(push)?,
        };
        let Value::Object(mut map) = body else {
            return Err(TaskWireError::Internal(
                "message did not serialize to an object".to_string(),
            ));
        };
        map.insert("type".to_string(), Value::String(self.tag().to_string()));
        Ok(Value::Object(map))
    }

    /// Decode from a JSON object value, routing off the `type` tag.
    pub fn from_value(value: Value) -> Result<Self, TaskWireError> {
        let Value::Object(mut map) = value else {
            return Err(TaskWireError::BadFrame("frame is not an object".to_string()));
        };
        let Some(Value::String(tag)) = map.remove("type") else {
            return Err(TaskWireError::BadFrame(
                "frame has no string \"type\" field".to_string(),
            ));
        };
        let rest = Value::Object(map);
        let bad = |e: serde_json::Error| TaskWireError::BadFrame(e.to_string());
        match tag.as_str() {
            "OK" => Ok(Message::Ok(serde_json::from_value(rest).map_err(bad)?)),
            "ERR" => Ok(Message::Err(serde_json::from_value(rest).map_err(bad)?)),
            "PUSH" => Ok(Message::Push(serde_json::from_value(rest).map_err(bad)?)),
            _ => {
                let mut request: Request = serde_json::from_value(rest).map_err(bad)?;
                request.task_type = tag;
                Ok(Message::Request(request))
            }
        }
    }

    /// Encode to wire text.
    pub fn to_json(&self) -> Result<String, TaskWireError> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }

    /// Decode from wire text. Any failure is a [`TaskWireError::BadFrame`].
    pub fn from_json(text: &str) -> Result<Self, TaskWireError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| TaskWireError::BadFrame(e.to_string()))?;
        Self::from_value(value)
    }
}

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let value = self.to_value().map_err(serde::ser::Error::custom)?;
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Message::from_value(value).map_err(serde::de::Error::custom)
    }
}
