//! Service-level types and traits for the client and server roles

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub use client::{AsyncTaskClient, ClientEvent, ClientOptions, Tolerance};

#[cfg(feature = "server")]
pub use server::{ConnectionHandle, ConnectionId, ConnectionRegistry, PushScope, ServerEvent};
