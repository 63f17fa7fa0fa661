//! Core domain types for the taskwire protocol

pub mod error;
pub mod message;

pub use error::{TaskError, TaskWireError};
pub use message::{
    ErrReply, Message, OkReply, Push, Request, ABNORMAL_CLOSURE, GOING_AWAY, PING_TYPE,
    PROTOCOL_ERROR, SERVER_SHUTTING_OFF,
};
