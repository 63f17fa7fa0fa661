//! WebSocket server dispatcher.
//!
//! Accepts connections, decodes request frames, runs each through the
//! middleware chain to its schema handler, and answers on the originating
//! connection. Also originates PUSH frames toward a scoped set of
//! connections. Replies and pushes whose connection has closed are surfaced
//! as `Stale` events and never transmitted.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::adapter::error::WebSocketServerError;
use crate::adapter::transport::websocket::socket::{Socket, SocketEvent};
use crate::adapter::transport::Outbound;
use crate::application::processor::RequestProcessor;
use crate::application::schema::Schema;
use crate::domain::error::TaskWireError;
use crate::domain::message::{Message, Push, PROTOCOL_ERROR, SERVER_SHUTTING_OFF};
use crate::port::handler::Healthcheck;
use crate::port::middleware::Middleware;
use crate::services::server::{ConnectionHandle, ConnectionRegistry, PushScope, ServerEvent};

/// WebSocket server for the taskwire protocol.
pub struct WebSocketServer {
    processor: Arc<RequestProcessor>,
    registry: ConnectionRegistry,
    events: broadcast::Sender<ServerEvent>,
    shutdown: Arc<Notify>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl WebSocketServer {
    /// Create a server dispatching to `schema`.
    pub fn new(schema: Schema) -> Self {
        Self::with_processor(Arc::new(RequestProcessor::new(schema)))
    }

    /// Create a server around an existing processor, e.g. one shared with an
    /// [`HttpServer`](crate::adapter::HttpServer).
    pub fn with_processor(processor: Arc<RequestProcessor>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            processor,
            registry: ConnectionRegistry::new(),
            events,
            shutdown: Arc::new(Notify::new()),
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Install the healthcheck behind the reserved `$PING` task type.
    pub fn with_healthcheck(self, healthcheck: impl Healthcheck + 'static) -> Self {
        self.processor.set_healthcheck(healthcheck);
        self
    }

    /// Append a middleware to the dispatch chain.
    pub fn use_middleware(&self, middleware: impl Middleware + 'static) {
        self.processor.use_middleware(middleware);
    }

    pub fn processor(&self) -> Arc<RequestProcessor> {
        self.processor.clone()
    }

    /// The connection registry, for sharing with the HTTP admin surface.
    pub fn registry(&self) -> ConnectionRegistry {
        self.registry.clone()
    }

    /// Subscribe to connection, request, reply, stale, and error events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// The bound address, once `listen` has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap()
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Bind `addr` and start accepting connections in a background task.
    #[instrument(skip(self), fields(server.addr = %addr))]
    pub async fn listen(&self, addr: &str) -> Result<(), TaskWireError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(WebSocketServerError::Io)?;
        let local_addr = listener.local_addr().map_err(WebSocketServerError::Io)?;
        *self.local_addr.lock().unwrap() = Some(local_addr);
        info!(%local_addr, "WebSocket server listening");

        let processor = self.processor.clone();
        let registry = self.registry.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let processor = processor.clone();
                            let registry = registry.clone();
                            let events = events.clone();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    handle_connection(stream, peer, processor, registry, events.clone())
                                        .await
                                {
                                    error!(%peer, error = %e, "connection failed");
                                    let _ = events.send(ServerEvent::Error(e.to_string()));
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "accept failed");
                            let _ = events.send(ServerEvent::Error(e.to_string()));
                        }
                    }
                }
            }
        });
        *self.accept_task.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Stop accepting and close every live connection with code 1000, which
    /// tells clients to reconnect elsewhere.
    pub async fn close(&self) {
        info!("closing WebSocket server");
        self.shutdown.notify_waiters();
        self.registry.close_all(SERVER_SHUTTING_OFF).await;
        let task = self.accept_task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Send an out-of-band PUSH to the scoped connections. Targets that are
    /// no longer open are skipped with a `Stale` event.
    pub async fn push(&self, event: &str, payload: Value, scope: impl Into<PushScope>) {
        let message = Message::Push(Push::new(event, payload));
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "failed to encode push");
                let _ = self.events.send(ServerEvent::Error(e.to_string()));
                return;
            }
        };
        let targets = match scope.into() {
            PushScope::Broadcast => self.registry.all().await,
            PushScope::One(id) => self.registry.get(id).await.into_iter().collect(),
            PushScope::Many(ids) => {
                let mut targets = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(handle) = self.registry.get(id).await {
                        targets.push(handle);
                    }
                }
                targets
            }
        };
        for handle in targets {
            if !handle.is_open() {
                let _ = self.events.send(ServerEvent::Stale(message.clone()));
                continue;
            }
            if handle.send_text(text.clone()).await.is_err() {
                let _ = self.events.send(ServerEvent::Stale(message.clone()));
            }
        }
    }
}

/// Drive one accepted connection until it closes.
#[instrument(skip_all, fields(%peer))]
async fn handle_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    processor: Arc<RequestProcessor>,
    registry: ConnectionRegistry,
    events: broadcast::Sender<ServerEvent>,
) -> Result<(), WebSocketServerError> {
    let socket = Socket::accept(stream).await?;
    let handle = registry.register(socket.outbound.clone()).await;
    debug!(connection = handle.id(), "connection established");
    let _ = events.send(ServerEvent::Connection(handle.id()));

    let mut socket_events = socket.events;
    while let Some(event) = socket_events.recv().await {
        match event {
            SocketEvent::Message(text) => match Message::from_json(&text) {
                Ok(Message::Request(request)) => {
                    let _ = events.send(ServerEvent::Request(request.clone()));
                    let processor = processor.clone();
                    let handle = handle.clone();
                    let events = events.clone();
                    tokio::spawn(async move {
                        let reply = processor.process(request).await;
                        let _ = events.send(ServerEvent::Reply(reply.clone()));
                        deliver(&handle, reply, &events).await;
                    });
                }
                Ok(other) => {
                    debug!(tag = other.tag(), "ignoring non-request frame");
                }
                Err(e) => {
                    warn!(error = %e, "closing connection after malformed frame");
                    let _ = events.send(ServerEvent::Error(e.to_string()));
                    let _ = socket.outbound.send(Outbound::Close(PROTOCOL_ERROR)).await;
                    break;
                }
            },
            SocketEvent::Error(e) => {
                let _ = events.send(ServerEvent::Error(e));
                break;
            }
            SocketEvent::Closed(_code) => break,
        }
    }

    handle.mark_closed();
    registry.remove(handle.id()).await;
    debug!(connection = handle.id(), "connection closed");
    let _ = events.send(ServerEvent::Terminated(handle.id()));
    Ok(())
}

/// Send a reply on its originating connection, or surface it as stale if
/// that connection is gone.
async fn deliver(handle: &ConnectionHandle, reply: Message, events: &broadcast::Sender<ServerEvent>) {
    if !handle.is_open() {
        debug!(connection = handle.id(), "reply outlived its connection");
        let _ = events.send(ServerEvent::Stale(reply));
        return;
    }
    match reply.to_json() {
        Ok(text) => {
            if handle.send_text(text).await.is_err() {
                let _ = events.send(ServerEvent::Stale(reply));
            }
        }
        Err(e) => {
            error!(error = %e, "failed to encode reply");
            let _ = events.send(ServerEvent::Error(e.to_string()));
        }
    }
}
