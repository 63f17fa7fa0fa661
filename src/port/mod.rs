//! Trait seams between the dispatch core and user-supplied code

pub mod handler;
pub mod middleware;

pub use handler::{Healthcheck, TaskHandler};
pub use middleware::{Middleware, Next};
