//! HTTP transport adapters

#[cfg(feature = "http-client")]
pub mod client;

#[cfg(feature = "http-server")]
pub mod server;
