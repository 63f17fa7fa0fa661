//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value};
use taskwire::{Schema, TaskError};
use tokio::sync::broadcast;

/// The schema used across the integration tests.
pub fn arithmetic_schema() -> Schema {
    Schema::new()
        .register("ADD", |payload: Value| async move {
            let x = payload["x"].as_i64().unwrap_or(0);
            let y = payload["y"].as_i64().unwrap_or(0);
            Ok::<_, TaskError>(json!(x + y))
        })
        .register("ECHO", |payload: Value| async move { Ok::<_, TaskError>(payload) })
        .register("FAIL", |_payload: Value| async move {
            Err::<Value, _>(TaskError::new("teapot").with_code(418))
        })
        .register("SLEEP", |_payload: Value| async move {
            std::future::pending::<Result<Value, TaskError>>().await
        })
        .register("NAP", |_payload: Value| async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok::<_, TaskError>(json!("woke"))
        })
}

/// Wait up to five seconds for an event matching `matches`, skipping others.
pub async fn wait_for<T, F>(
    events: &mut broadcast::Receiver<T>,
    description: &str,
    matches: F,
) -> T
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("event stream closed while waiting for {description}")
                }
            }
        }
    })
    .await;
    result.unwrap_or_else(|_| panic!("timed out waiting for {description}"))
}
