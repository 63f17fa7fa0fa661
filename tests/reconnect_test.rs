//! Reconnection, drain rotation, and re-dispatch of pending requests

#![cfg(all(feature = "ws-client", feature = "ws-server"))]

mod common;

use std::time::Duration;

use serde_json::json;
use taskwire::{
    AsyncTaskClient, ClientEvent, ClientOptions, WebSocketClient, WebSocketServer,
};

#[tokio::test]
async fn reconnects_after_server_restart_and_resolves_downtime_requests() {
    let addr = "127.0.0.1:18802";
    let server = WebSocketServer::new(common::arithmetic_schema());
    server.listen(addr).await.unwrap();

    let options = ClientOptions::default()
        .no_server(true)
        .reconnect_interval(Duration::from_millis(100));
    let client = WebSocketClient::with_options(format!("ws://{addr}"), options);
    let mut events = client.subscribe_events();
    client.connect();
    common::wait_for(&mut events, "ready", |e| matches!(e, ClientEvent::Ready)).await;

    // The server shuts off with close code 1000: the client reports the
    // closure, then fails to reconnect while nothing is listening.
    server.close().await;
    common::wait_for(&mut events, "host-closed", |e| {
        matches!(e, ClientEvent::HostClosed)
    })
    .await;
    common::wait_for(&mut events, "reconnect-failed", |e| {
        matches!(e, ClientEvent::ReconnectFailed)
    })
    .await;

    // A request issued during downtime is held until the transport reopens.
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.dispatch("ADD", json!({"x": 2, "y": 2})).await })
    };

    let replacement = WebSocketServer::new(common::arithmetic_schema());
    replacement.listen(addr).await.unwrap();
    common::wait_for(&mut events, "reconnected", |e| {
        matches!(e, ClientEvent::Reconnected)
    })
    .await;

    assert_eq!(pending.await.unwrap().unwrap(), json!(4));

    client.close().await;
    replacement.close().await;
}

#[tokio::test]
async fn drain_rotation_is_invisible_to_inflight_requests() {
    let addr = "127.0.0.1:18803";
    let server = WebSocketServer::new(common::arithmetic_schema());
    server.listen(addr).await.unwrap();

    let options = ClientOptions::default()
        .no_server(true)
        .drain_interval(Duration::from_millis(100))
        .reconnect_interval(Duration::from_millis(100));
    let client = WebSocketClient::with_options(format!("ws://{addr}"), options);
    let mut events = client.subscribe_events();
    client.connect();
    common::wait_for(&mut events, "ready", |e| matches!(e, ClientEvent::Ready)).await;

    // A request slower than the drain interval: the rotation must neither
    // drop it nor report the host as gone.
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.dispatch("NAP", json!(null)).await })
    };

    let mut seen = Vec::new();
    loop {
        let event = common::wait_for(&mut events, "rotation events", |e| {
            matches!(
                e,
                ClientEvent::Reconnecting | ClientEvent::Reconnected | ClientEvent::HostClosed
            )
        })
        .await;
        seen.push(event.clone());
        if matches!(event, ClientEvent::Reconnected) {
            break;
        }
    }
    assert!(seen.iter().any(|e| matches!(e, ClientEvent::Reconnecting)));
    assert!(!seen.iter().any(|e| matches!(e, ClientEvent::HostClosed)));

    assert_eq!(pending.await.unwrap().unwrap(), json!("woke"));

    client.close().await;
    server.close().await;
}
