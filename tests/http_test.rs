//! HTTP transport variant: one-shot requests, healthcheck, admin disconnect

#![cfg(all(feature = "http-client", feature = "http-server"))]

mod common;

use serde_json::{json, Value};
use taskwire::{AsyncTaskClient, HttpClient, HttpServer, TaskError, TaskWireError};

#[tokio::test]
async fn add_round_trips_over_http() {
    let server = HttpServer::new(common::arithmetic_schema());
    server.listen("127.0.0.1:18805").await.unwrap();

    let client = HttpClient::new("http://127.0.0.1:18805");
    let sum: i64 = client.call("ADD", json!({"x": 3, "y": 5})).await.unwrap();
    assert_eq!(sum, 8);

    server.close().await;
}

#[tokio::test]
async fn error_codes_map_to_http_statuses() {
    let server = HttpServer::new(common::arithmetic_schema());
    server.listen("127.0.0.1:18810").await.unwrap();

    let client = HttpClient::new("http://127.0.0.1:18810");

    let error = client.dispatch("NOPE", json!({})).await.unwrap_err();
    match error {
        TaskWireError::Task(error) => {
            assert_eq!(error.code, Some(404));
            assert_eq!(error.message, "Unknown request type: \"NOPE\"");
        }
        other => panic!("expected Task error, got {other:?}"),
    }

    let error = client.dispatch("FAIL", json!(null)).await.unwrap_err();
    match error {
        TaskWireError::Task(error) => {
            assert_eq!(error.code, Some(418));
            assert_eq!(error.message, "teapot");
        }
        other => panic!("expected Task error, got {other:?}"),
    }

    server.close().await;
}

#[tokio::test]
async fn healthcheck_endpoint_reports_both_outcomes() {
    let healthy = HttpServer::new(common::arithmetic_schema())
        .with_healthcheck(|| async { Ok::<_, TaskError>(json!({"status": "up"})) });
    healthy.listen("127.0.0.1:18811").await.unwrap();

    let client = HttpClient::new("http://127.0.0.1:18811");
    assert_eq!(client.healthcheck().await.unwrap(), json!({"status": "up"}));
    healthy.close().await;

    let degraded = HttpServer::new(common::arithmetic_schema()).with_healthcheck(|| async {
        Err::<Value, _>(TaskError::new("degraded").with_code(503))
    });
    degraded.listen("127.0.0.1:18812").await.unwrap();

    let client = HttpClient::new("http://127.0.0.1:18812");
    let error = client.healthcheck().await.unwrap_err();
    match error {
        TaskWireError::Task(error) => assert_eq!(error.code, Some(503)),
        other => panic!("expected Task error, got {other:?}"),
    }
    degraded.close().await;
}

#[tokio::test]
async fn ping_task_type_reaches_the_healthcheck_over_http() {
    let server = HttpServer::new(common::arithmetic_schema())
        .with_healthcheck(|| async { Ok::<_, TaskError>(json!("healthy")) });
    server.listen("127.0.0.1:18813").await.unwrap();

    let client = HttpClient::new("http://127.0.0.1:18813");
    let health = client.dispatch(taskwire::PING_TYPE, Value::Null).await.unwrap();
    assert_eq!(health, json!("healthy"));

    server.close().await;
}

#[cfg(all(feature = "ws-client", feature = "ws-server"))]
#[tokio::test]
async fn admin_disconnect_severs_websocket_connections() {
    use std::time::Duration;
    use taskwire::{ClientEvent, ClientOptions, WebSocketClient, WebSocketServer};

    let ws_server = WebSocketServer::new(common::arithmetic_schema());
    ws_server.listen("127.0.0.1:18806").await.unwrap();

    let http_server = HttpServer::with_processor(ws_server.processor())
        .with_connections(ws_server.registry());
    http_server.listen("127.0.0.1:18807").await.unwrap();

    let options = ClientOptions::default()
        .no_server(true)
        .reconnect_interval(Duration::from_millis(100));
    let ws_client = WebSocketClient::with_options("ws://127.0.0.1:18806", options);
    let mut events = ws_client.subscribe_events();
    ws_client.connect();
    common::wait_for(&mut events, "ready", |e| matches!(e, ClientEvent::Ready)).await;

    let admin = HttpClient::new("http://127.0.0.1:18807");
    admin.disconnect_all().await.unwrap();

    // The shutting-off close code sends the client into the reconnect path,
    // and the still-running listener picks it back up.
    common::wait_for(&mut events, "host-closed", |e| {
        matches!(e, ClientEvent::HostClosed)
    })
    .await;
    common::wait_for(&mut events, "reconnected", |e| {
        matches!(e, ClientEvent::Reconnected)
    })
    .await;

    ws_client.close().await;
    http_server.close().await;
    ws_server.close().await;
}
