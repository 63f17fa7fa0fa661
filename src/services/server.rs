//! Server-side service surface: connection registry, push scoping, events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::adapter::transport::Outbound;
use crate::domain::error::TaskWireError;
use crate::domain::message::{Message, Request};

/// Identifies one live connection for the lifetime of the server.
pub type ConnectionId = u64;

/// A handle to one accepted connection: the outbound writer plus its open
/// state. Replies and pushes consult `is_open` at send time; a closed handle
/// produces a `Stale` event instead of bytes.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Outbound>,
    open: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub(crate) async fn send_text(&self, text: String) -> Result<(), TaskWireError> {
        self.outbound
            .send(Outbound::Text(text))
            .await
            .map_err(|_| TaskWireError::Transport("connection writer is gone".to_string()))
    }

    pub(crate) async fn close(&self, code: u16) {
        self.mark_closed();
        let _ = self.outbound.send(Outbound::Close(code)).await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// The set of currently-registered connections, shared between the WebSocket
/// dispatcher and the HTTP admin surface.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    connections: Mutex<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn register(&self, outbound: mpsc::Sender<Outbound>) -> ConnectionHandle {
        let handle = ConnectionHandle {
            id: self.inner.next_id.fetch_add(1, Ordering::SeqCst),
            outbound,
            open: Arc::new(AtomicBool::new(true)),
        };
        self.inner
            .connections
            .lock()
            .await
            .insert(handle.id, handle.clone());
        handle
    }

    pub(crate) async fn remove(&self, id: ConnectionId) {
        self.inner.connections.lock().await.remove(&id);
    }

    pub async fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.inner.connections.lock().await.get(&id).cloned()
    }

    pub async fn all(&self) -> Vec<ConnectionHandle> {
        self.inner.connections.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.connections.lock().await.is_empty()
    }

    /// Close every live connection with the given close code.
    pub async fn close_all(&self, code: u16) {
        for handle in self.all().await {
            handle.close(code).await;
        }
    }
}

/// Which connections a push targets.
#[derive(Debug, Clone)]
pub enum PushScope {
    /// Every currently-open connection.
    Broadcast,
    One(ConnectionId),
    Many(Vec<ConnectionId>),
}

impl From<ConnectionId> for PushScope {
    fn from(id: ConnectionId) -> Self {
        PushScope::One(id)
    }
}

impl From<Vec<ConnectionId>> for PushScope {
    fn from(ids: Vec<ConnectionId>) -> Self {
        PushScope::Many(ids)
    }
}

/// Notifications observable on a server.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A connection completed its handshake.
    Connection(ConnectionId),
    /// A connection went away.
    Terminated(ConnectionId),
    /// A request frame was accepted.
    Request(Request),
    /// A reply was produced (whether or not it could be delivered).
    Reply(Message),
    /// A reply or push whose connection was no longer open; nothing was sent.
    Stale(Message),
    /// A transport, framing, or delivery fault.
    Error(String),
}
