//! Per-request timeout and bounded retransmission

#![cfg(all(feature = "ws-client", feature = "ws-server"))]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use taskwire::{
    AsyncTaskClient, ClientEvent, ClientOptions, ServerEvent, TaskWireError, WebSocketClient,
    WebSocketServer,
};

#[tokio::test]
async fn exhausted_attempts_fail_with_timeout() {
    let server = WebSocketServer::new(common::arithmetic_schema());
    server.listen("127.0.0.1:18801").await.unwrap();

    let received = Arc::new(AtomicUsize::new(0));
    {
        let mut events = server.subscribe_events();
        let received = received.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let ServerEvent::Request(request) = event {
                    if request.task_type == "SLEEP" {
                        received.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        });
    }

    let options = ClientOptions::default()
        .timeout(Duration::from_millis(200))
        .attempts(2)
        .reconnect_interval(Duration::from_millis(100));
    let client = WebSocketClient::with_options("ws://127.0.0.1:18801", options);
    let mut client_events = client.subscribe_events();

    let started = Instant::now();
    let result = client.dispatch("SLEEP", json!(null)).await;
    assert!(matches!(result, Err(TaskWireError::Timeout)));
    assert!(started.elapsed() >= Duration::from_millis(400));

    common::wait_for(&mut client_events, "timeout event", |e| {
        matches!(e, ClientEvent::Timeout { .. })
    })
    .await;

    // One transmission per attempt, no more.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(received.load(Ordering::SeqCst), 2);

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn ping_has_its_own_deadline() {
    let server = WebSocketServer::new(common::arithmetic_schema())
        .with_healthcheck(|| async {
            std::future::pending::<Result<serde_json::Value, taskwire::TaskError>>().await
        });
    server.listen("127.0.0.1:18808").await.unwrap();

    let client = WebSocketClient::new("ws://127.0.0.1:18808");
    let mut client_events = client.subscribe_events();

    let started = Instant::now();
    let result = client.ping(Duration::from_millis(200)).await;
    assert!(matches!(result, Err(TaskWireError::Timeout)));
    // A single attempt: well under the dispatch chain's 10s default.
    assert!(started.elapsed() < Duration::from_secs(2));

    common::wait_for(&mut client_events, "ping timeout event", |e| {
        matches!(e, ClientEvent::PingTimeout)
    })
    .await;

    client.close().await;
    server.close().await;
}
