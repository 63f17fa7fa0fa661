//! WebSocket transport adapters

#[cfg(feature = "ws-client")]
pub mod client;

#[cfg(feature = "ws-server")]
pub mod server;

pub(crate) mod socket;
