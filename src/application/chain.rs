//! Composition of middlewares into a dispatch chain.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::error::TaskError;
use crate::domain::message::Request;
use crate::port::handler::TaskHandler;
use crate::port::middleware::{Middleware, Next};

/// An immutable snapshot of the middleware list, terminated by one handler.
///
/// Built per request by the [`RequestProcessor`](crate::application::RequestProcessor)
/// so that middlewares registered later never splice into a dispatch already
/// under way.
pub struct MiddlewareChain {
    middlewares: Arc<[Arc<dyn Middleware>]>,
    terminal: Arc<dyn TaskHandler>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Arc<[Arc<dyn Middleware>]>, terminal: Arc<dyn TaskHandler>) -> Self {
        Self {
            middlewares,
            terminal,
        }
    }

    /// Invoke the chain: middlewares in registration order, then the terminal
    /// handler, unless some middleware short-circuits.
    pub async fn invoke(&self, request: Request) -> Result<Value, TaskError> {
        Next {
            middlewares: self.middlewares.clone(),
            index: 0,
            terminal: self.terminal.clone(),
        }
        .run(request)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle(&self, request: Request, next: Next) -> Result<Value, TaskError> {
            self.log.lock().unwrap().push(format!("{}:before", self.name));
            let result = next.run(request).await;
            self.log.lock().unwrap().push(format!("{}:after", self.name));
            result
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn handle(&self, _request: Request, _next: Next) -> Result<Value, TaskError> {
            Ok(json!("short"))
        }
    }

    fn chain(middlewares: Vec<Arc<dyn Middleware>>, log: Arc<Mutex<Vec<String>>>) -> MiddlewareChain {
        let terminal = move |payload: Value| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("terminal".to_string());
                Ok::<_, TaskError>(payload)
            }
        };
        MiddlewareChain::new(middlewares.into(), Arc::new(terminal))
    }

    #[tokio::test]
    async fn middlewares_run_in_registration_order_around_the_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(
            vec![
                Arc::new(Recorder { name: "m1", log: log.clone() }),
                Arc::new(Recorder { name: "m2", log: log.clone() }),
            ],
            log.clone(),
        );

        let result = chain
            .invoke(Request::new("T", "id-1", json!(7)))
            .await
            .unwrap();
        assert_eq!(result, json!(7));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["m1:before", "m2:before", "terminal", "m2:after", "m1:after"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_the_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(
            vec![
                Arc::new(Recorder { name: "m1", log: log.clone() }),
                Arc::new(ShortCircuit),
            ],
            log.clone(),
        );

        let result = chain
            .invoke(Request::new("T", "id-2", json!(null)))
            .await
            .unwrap();
        assert_eq!(result, json!("short"));
        assert_eq!(*log.lock().unwrap(), vec!["m1:before", "m1:after"]);
    }

    #[tokio::test]
    async fn middleware_errors_propagate() {
        struct Failing;

        #[async_trait]
        impl Middleware for Failing {
            async fn handle(&self, _request: Request, _next: Next) -> Result<Value, TaskError> {
                Err(TaskError::new("denied").with_code(403))
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![Arc::new(Failing)], log.clone());
        let error = chain
            .invoke(Request::new("T", "id-3", json!(null)))
            .await
            .unwrap_err();
        assert_eq!(error.code, Some(403));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_chain_is_just_the_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![], log.clone());
        let result = chain
            .invoke(Request::new("T", "id-4", json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(result, json!({"a": 1}));
        assert_eq!(*log.lock().unwrap(), vec!["terminal"]);
    }
}
