//! Handler traits implemented by application code.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::TaskError;

/// An asynchronous handler for one task type.
///
/// The schema maps task-type names to values implementing this trait. Any
/// `Fn(Value) -> Future<Output = Result<Value, TaskError>>` closure works
/// directly:
///
/// ```rust
/// use serde_json::{json, Value};
/// use taskwire::{Schema, TaskError};
///
/// let schema = Schema::new().register("ADD", |payload: Value| async move {
///     let x = payload["x"].as_i64().unwrap_or(0);
///     let y = payload["y"].as_i64().unwrap_or(0);
///     Ok::<_, TaskError>(json!(x + y))
/// });
/// # let _ = schema;
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<Value, TaskError>;
}

#[async_trait]
impl<F, Fut> TaskHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskError>> + Send,
{
    async fn handle(&self, payload: Value) -> Result<Value, TaskError> {
        (self)(payload).await
    }
}

/// The user-supplied healthcheck, invoked by the reserved `$PING` task type
/// and by the HTTP `/healthcheck` endpoint.
#[async_trait]
pub trait Healthcheck: Send + Sync {
    async fn check(&self) -> Result<Value, TaskError>;
}

#[async_trait]
impl<F, Fut> Healthcheck for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskError>> + Send,
{
    async fn check(&self) -> Result<Value, TaskError> {
        (self)().await
    }
}
