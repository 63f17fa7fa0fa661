//! Request dispatch machinery: schema, middleware chain, pool, processor

pub mod chain;
pub mod pool;
pub mod processor;
pub mod schema;

pub use chain::MiddlewareChain;
pub use pool::{ConcurrencyPool, PoolMiddleware};
pub use processor::RequestProcessor;
pub use schema::Schema;
