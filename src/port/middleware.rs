//! Middleware seam for the server dispatch chain.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::TaskError;
use crate::domain::message::Request;
use crate::port::handler::TaskHandler;

/// A link in the server's dispatch chain.
///
/// Middlewares run in registration order. Each one receives the request and a
/// [`Next`] continuation; calling `next.run(request)` hands off to the rest
/// of the chain, ending at the schema handler. A middleware may rewrite the
/// request, inspect or rewrite the result, or short-circuit by returning
/// without calling `next`.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: Request, next: Next) -> Result<Value, TaskError>;
}

/// Continuation over the remaining middlewares and the terminal handler.
pub struct Next {
    pub(crate) middlewares: Arc<[Arc<dyn Middleware>]>,
    pub(crate) index: usize,
    pub(crate) terminal: Arc<dyn TaskHandler>,
}

impl Next {
    /// Run the rest of the chain on `request`.
    pub async fn run(mut self, request: Request) -> Result<Value, TaskError> {
        match self.middlewares.get(self.index).cloned() {
            Some(middleware) => {
                self.index += 1;
                middleware.handle(request, self).await
            }
            None => self.terminal.handle(request.payload).await,
        }
    }
}
