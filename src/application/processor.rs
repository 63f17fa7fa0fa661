//! Routing of decoded requests through the middleware chain to a handler.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::application::chain::MiddlewareChain;
use crate::application::schema::Schema;
use crate::domain::error::TaskError;
use crate::domain::message::{ErrReply, Message, OkReply, Request, PING_TYPE};
use crate::port::handler::{Healthcheck, TaskHandler};
use crate::port::middleware::Middleware;

/// Routes a request to its schema handler through the middleware chain.
///
/// Shared by the WebSocket dispatcher and the HTTP variant so both transports
/// answer identically. Middlewares appended while requests are in flight only
/// affect requests dispatched afterwards.
pub struct RequestProcessor {
    schema: Schema,
    middlewares: Mutex<Vec<Arc<dyn Middleware>>>,
    healthcheck: Mutex<Option<Arc<dyn Healthcheck>>>,
}

impl RequestProcessor {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            middlewares: Mutex::new(Vec::new()),
            healthcheck: Mutex::new(None),
        }
    }

    /// Append a middleware to the chain.
    pub fn use_middleware(&self, middleware: impl Middleware + 'static) {
        self.middlewares.lock().unwrap().push(Arc::new(middleware));
    }

    /// Install the healthcheck behind `$PING` and `/healthcheck`.
    pub fn set_healthcheck(&self, healthcheck: impl Healthcheck + 'static) {
        *self.healthcheck.lock().unwrap() = Some(Arc::new(healthcheck));
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Dispatch one request and return the handler outcome.
    pub async fn dispatch(&self, request: Request) -> Result<Value, TaskError> {
        let terminal: Arc<dyn TaskHandler> = match self.schema.handler(&request.task_type) {
            Some(handler) => handler,
            None if request.task_type == PING_TYPE => {
                Arc::new(HealthcheckHandler(self.healthcheck.lock().unwrap().clone()))
            }
            None => {
                debug!(task_type = %request.task_type, "rejecting unknown request type");
                return Err(TaskError::new(format!(
                    "Unknown request type: {:?}",
                    request.task_type
                ))
                .with_code(404));
            }
        };
        let middlewares: Arc<[Arc<dyn Middleware>]> =
            self.middlewares.lock().unwrap().clone().into();
        MiddlewareChain::new(middlewares, terminal)
            .invoke(request)
            .await
    }

    /// Dispatch one request and shape the outcome as a reply frame.
    pub async fn process(&self, request: Request) -> Message {
        let id = request.id.clone();
        match self.dispatch(request).await {
            Ok(payload) => Message::Ok(OkReply::new(id, payload)),
            Err(error) => Message::Err(ErrReply::new(id, error.to_value())),
        }
    }

    /// Run the healthcheck directly. Without an installed healthcheck the
    /// endpoint reports healthy with a null payload.
    pub async fn healthcheck(&self) -> Result<Value, TaskError> {
        let healthcheck = self.healthcheck.lock().unwrap().clone();
        match healthcheck {
            Some(healthcheck) => healthcheck.check().await,
            None => Ok(Value::Null),
        }
    }
}

struct HealthcheckHandler(Option<Arc<dyn Healthcheck>>);

#[async_trait]
impl TaskHandler for HealthcheckHandler {
    async fn handle(&self, _payload: Value) -> Result<Value, TaskError> {
        match &self.0 {
            Some(healthcheck) => healthcheck.check().await,
            None => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adder() -> Schema {
        Schema::new().register("ADD", |payload: Value| async move {
            let x = payload["x"].as_i64().unwrap_or(0);
            let y = payload["y"].as_i64().unwrap_or(0);
            Ok::<_, TaskError>(json!(x + y))
        })
    }

    #[tokio::test]
    async fn dispatches_to_the_schema_handler() {
        let processor = RequestProcessor::new(adder());
        let reply = processor
            .process(Request::new("ADD", "r1", json!({"x": 3, "y": 5})))
            .await;
        assert_eq!(reply, Message::Ok(OkReply::new("r1", json!(8))));
    }

    #[tokio::test]
    async fn unknown_types_get_a_descriptive_err() {
        let processor = RequestProcessor::new(adder());
        let reply = processor
            .process(Request::new("NOPE", "r2", json!({})))
            .await;
        let Message::Err(reply) = reply else {
            panic!("expected ERR");
        };
        let error = TaskError::from_value(reply.error);
        assert_eq!(error.message, "Unknown request type: \"NOPE\"");
        assert_eq!(error.code, Some(404));
    }

    #[tokio::test]
    async fn handler_errors_become_err_replies() {
        let schema = Schema::new().register("FAIL", |_payload: Value| async move {
            Err::<Value, _>(TaskError::new("boom").with_code(418))
        });
        let processor = RequestProcessor::new(schema);
        let reply = processor.process(Request::new("FAIL", "r3", json!(null))).await;
        let Message::Err(reply) = reply else {
            panic!("expected ERR");
        };
        assert_eq!(TaskError::from_value(reply.error).code, Some(418));
    }

    #[tokio::test]
    async fn ping_routes_to_the_healthcheck() {
        let processor = RequestProcessor::new(Schema::new());
        processor.set_healthcheck(|| async { Ok::<_, TaskError>(json!("healthy")) });
        let reply = processor
            .process(Request::new(PING_TYPE, "r4", json!(null)))
            .await;
        assert_eq!(reply, Message::Ok(OkReply::new("r4", json!("healthy"))));
    }

    #[tokio::test]
    async fn ping_without_a_healthcheck_resolves_null() {
        let processor = RequestProcessor::new(Schema::new());
        let reply = processor
            .process(Request::new(PING_TYPE, "r5", json!(null)))
            .await;
        assert_eq!(reply, Message::Ok(OkReply::new("r5", Value::Null)));
    }

    #[tokio::test]
    async fn a_schema_entry_shadows_the_reserved_ping() {
        let schema = Schema::new().register(PING_TYPE, |_payload: Value| async move {
            Ok::<_, TaskError>(json!("mine"))
        });
        let processor = RequestProcessor::new(schema);
        processor.set_healthcheck(|| async { Ok::<_, TaskError>(json!("healthy")) });
        let reply = processor
            .process(Request::new(PING_TYPE, "r6", json!(null)))
            .await;
        assert_eq!(reply, Message::Ok(OkReply::new("r6", json!("mine"))));
    }
}
