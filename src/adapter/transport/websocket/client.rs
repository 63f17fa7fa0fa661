//! WebSocket client coordinator.
//!
//! Multiplexes in-flight requests over a single transport, correlates replies
//! by id, enforces per-request timeouts with bounded retransmission, and
//! recovers from transport loss: abnormal closes and server shutdowns trigger
//! reconnection, a configured drain interval rotates the transport
//! gracefully, and a timeout-tolerance window recycles a wedged one. Requests
//! stranded on a dead transport are re-dispatched on the new one, one
//! transmission per attempt.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapter::transport::websocket::socket::{Socket, SocketEvent};
use crate::adapter::transport::Outbound;
use crate::domain::error::{TaskError, TaskWireError};
use crate::domain::message::{
    Message, Push, Request, GOING_AWAY, PING_TYPE, PROTOCOL_ERROR, SERVER_SHUTTING_OFF,
};
use crate::services::client::{AsyncTaskClient, ClientEvent, ClientOptions};

/// Reply payload or error value, as delivered by the transport.
type ReplyOutcome = Result<Value, Value>;

struct PendingEntry {
    request: Request,
    /// Transport epoch of the latest transmission; 0 before the first one.
    epoch: u64,
    responder: oneshot::Sender<ReplyOutcome>,
}

struct ConnState {
    epoch: u64,
    outbound: mpsc::Sender<Outbound>,
}

/// A rotated-away transport waiting for its pending ids to resolve before it
/// closes gracefully.
struct DrainState {
    ids: HashSet<String>,
    outbound: mpsc::Sender<Outbound>,
}

#[derive(Default)]
struct WindowStats {
    requests: u64,
    timeouts: u64,
}

struct ClientInner {
    url: String,
    options: ClientOptions,
    pending: Mutex<HashMap<String, PendingEntry>>,
    conn: Mutex<Option<ConnState>>,
    epoch_counter: AtomicU64,
    /// Carries the epoch of the live transport; 0 while disconnected. Doubles
    /// as the "opened" latch that dispatches wait on.
    opened: watch::Sender<u64>,
    events: broadcast::Sender<ClientEvent>,
    pushes: broadcast::Sender<Push>,
    stats: Mutex<WindowStats>,
    drains: Mutex<Vec<DrainState>>,
    closed: AtomicBool,
    started: AtomicBool,
    recycle: Notify,
}

/// A reconnecting WebSocket client.
///
/// Constructing one connects immediately (unless `no_server` is set) and
/// keeps the transport alive across server restarts. `dispatch` may be called
/// from any number of tasks; requests issued while disconnected are sent once
/// the transport opens.
#[derive(Clone)]
pub struct WebSocketClient {
    inner: Arc<ClientInner>,
}

impl WebSocketClient {
    /// Connect to `url` with default options.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_options(url, ClientOptions::default())
    }

    /// Connect to `url` with explicit options. Must be called within a tokio
    /// runtime.
    pub fn with_options(url: impl Into<String>, options: ClientOptions) -> Self {
        let (opened, _) = watch::channel(0);
        let (events, _) = broadcast::channel(64);
        let (pushes, _) = broadcast::channel(64);
        let no_server = options.no_server;
        let client = Self {
            inner: Arc::new(ClientInner {
                url: url.into(),
                options,
                pending: Mutex::new(HashMap::new()),
                conn: Mutex::new(None),
                epoch_counter: AtomicU64::new(0),
                opened,
                events,
                pushes,
                stats: Mutex::new(WindowStats::default()),
                drains: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                started: AtomicBool::new(false),
                recycle: Notify::new(),
            }),
        };
        if !no_server {
            client.connect();
        }
        client
    }

    /// Start the connection lifecycle. A no-op after the first call.
    pub fn connect(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(run_lifecycle(self.inner.clone()));
        tokio::spawn(run_tolerance(self.inner.clone()));
    }

    /// Subscribe to lifecycle and per-request events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribe to every PUSH frame the server sends.
    pub fn subscribe_pushes(&self) -> broadcast::Receiver<Push> {
        self.inner.pushes.subscribe()
    }

    /// Subscribe to PUSH frames carrying one event name.
    pub fn pushes_for(&self, event: impl Into<String>) -> PushSubscription {
        PushSubscription {
            receiver: self.inner.pushes.subscribe(),
            event: event.into(),
        }
    }

    /// Send the reserved `$PING` task with its own deadline, outside the
    /// dispatch retry chain.
    pub async fn ping(&self, timeout: Duration) -> Result<Value, TaskWireError> {
        self.dispatch_with(PING_TYPE, Value::Null, timeout, 1, true)
            .await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Sever the transport. Pending and future dispatches fail with
    /// [`TaskWireError::Closed`].
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing client");
        self.inner.opened.send_replace(0);
        let conn = self.inner.conn.lock().unwrap().take();
        if let Some(conn) = conn {
            let _ = conn.outbound.send(Outbound::Close(GOING_AWAY)).await;
        }
        // Dropping the entries drops their responders; waiting dispatches
        // observe the hangup as `Closed`.
        self.inner.pending.lock().unwrap().clear();
        self.inner.drains.lock().unwrap().clear();
    }

    async fn dispatch_with(
        &self,
        task_type: &str,
        payload: Value,
        timeout: Duration,
        attempts: u32,
        is_ping: bool,
    ) -> Result<Value, TaskWireError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(TaskWireError::Closed);
        }
        let id = Uuid::new_v4().to_string();
        let request = Request::new(task_type, id.clone(), payload);
        let (responder, mut reply_rx) = oneshot::channel();
        inner.pending.lock().unwrap().insert(
            id.clone(),
            PendingEntry {
                request: request.clone(),
                epoch: 0,
                responder,
            },
        );
        if !is_ping {
            inner.stats.lock().unwrap().requests += 1;
            let _ = inner.events.send(ClientEvent::Request {
                id: id.clone(),
                task_type: task_type.to_string(),
            });
        }

        if let Err(e) = self.transmit(&id, &request).await {
            inner.pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        let mut attempts_left = attempts.max(1);
        loop {
            attempts_left -= 1;
            match tokio::time::timeout(timeout, &mut reply_rx).await {
                Ok(Ok(Ok(payload))) => return Ok(payload),
                Ok(Ok(Err(error))) => return Err(TaskWireError::Task(TaskError::from_value(error))),
                Ok(Err(_)) => return Err(TaskWireError::Closed),
                Err(_) => {
                    if attempts_left == 0 {
                        inner.pending.lock().unwrap().remove(&id);
                        if is_ping {
                            let _ = inner.events.send(ClientEvent::PingTimeout);
                        } else {
                            inner.stats.lock().unwrap().timeouts += 1;
                            let _ = inner.events.send(ClientEvent::Timeout { id: id.clone() });
                        }
                        return Err(TaskWireError::Timeout);
                    }
                    debug!(id = %id, attempts_left, "attempt expired, retransmitting");
                    if let Err(e) = self.transmit(&id, &request).await {
                        inner.pending.lock().unwrap().remove(&id);
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Wait for an open transport, then send the request on it and record
    /// the transport epoch in the pending entry.
    async fn transmit(&self, id: &str, request: &Request) -> Result<(), TaskWireError> {
        let inner = &self.inner;
        let mut opened = inner.opened.subscribe();
        let epoch = loop {
            if inner.closed.load(Ordering::SeqCst) {
                return Err(TaskWireError::Closed);
            }
            let current = *opened.borrow_and_update();
            if current != 0 {
                break current;
            }
            if opened.changed().await.is_err() {
                return Err(TaskWireError::Closed);
            }
        };
        let outbound = inner
            .conn
            .lock()
            .unwrap()
            .as_ref()
            .map(|conn| conn.outbound.clone());
        let Some(outbound) = outbound else {
            // The transport raced away between the latch and here; the
            // reconnect path re-dispatches this entry.
            return Ok(());
        };
        let text = Message::Request(request.clone()).to_json()?;
        if outbound.send(Outbound::Text(text)).await.is_err() {
            return Ok(());
        }
        if let Some(entry) = inner.pending.lock().unwrap().get_mut(id) {
            entry.epoch = epoch;
        }
        Ok(())
    }
}

#[async_trait]
impl AsyncTaskClient for WebSocketClient {
    async fn dispatch(&self, task_type: &str, payload: Value) -> Result<Value, TaskWireError> {
        self.dispatch_with(
            task_type,
            payload,
            self.inner.options.timeout,
            self.inner.options.attempts,
            false,
        )
        .await
    }
}

/// A push subscription filtered to one event name.
pub struct PushSubscription {
    receiver: broadcast::Receiver<Push>,
    event: String,
}

impl PushSubscription {
    /// The next matching push, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<Push> {
        loop {
            match self.receiver.recv().await {
                Ok(push) if push.event == self.event => return Some(push),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

enum Rotation {
    Reconnect,
    Terminal,
}

async fn run_lifecycle(inner: Arc<ClientInner>) {
    let mut first = true;
    loop {
        if inner.closed.load(Ordering::SeqCst) {
            break;
        }
        let socket = match Socket::dial(&inner.url).await {
            Ok(socket) => socket,
            Err(e) => {
                debug!(error = %e, "connection attempt failed");
                let _ = inner.events.send(ClientEvent::ReconnectFailed);
                tokio::time::sleep(inner.options.reconnect_interval).await;
                continue;
            }
        };
        if inner.closed.load(Ordering::SeqCst) {
            let _ = socket.outbound.send(Outbound::Close(GOING_AWAY)).await;
            break;
        }

        let epoch = inner.epoch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let outbound = socket.outbound.clone();
        let (closed_tx, closed_rx) = oneshot::channel();
        tokio::spawn(run_reader(
            inner.clone(),
            socket.events,
            outbound.clone(),
            closed_tx,
        ));

        *inner.conn.lock().unwrap() = Some(ConnState {
            epoch,
            outbound: outbound.clone(),
        });
        resling(&inner, epoch, &outbound).await;
        inner.opened.send_replace(epoch);
        if first {
            info!(url = %inner.url, "connected");
            let _ = inner.events.send(ClientEvent::Ready);
        } else {
            info!("reconnected");
            let _ = inner.events.send(ClientEvent::Reconnected);
        }
        first = false;

        match wait_for_rotation(&inner, epoch, closed_rx, &outbound).await {
            Rotation::Reconnect => {
                inner.opened.send_replace(0);
                *inner.conn.lock().unwrap() = None;
            }
            Rotation::Terminal => break,
        }
    }

    inner.closed.store(true, Ordering::SeqCst);
    inner.opened.send_replace(0);
    *inner.conn.lock().unwrap() = None;
    inner.pending.lock().unwrap().clear();
    inner.drains.lock().unwrap().clear();
}

/// Sit on an open transport until something forces a rotation or shutdown.
async fn wait_for_rotation(
    inner: &Arc<ClientInner>,
    epoch: u64,
    mut closed_rx: oneshot::Receiver<u16>,
    outbound: &mpsc::Sender<Outbound>,
) -> Rotation {
    let drain_tick = async {
        match inner.options.drain_interval {
            Some(interval) => tokio::time::sleep(interval).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(drain_tick);

    tokio::select! {
        code = &mut closed_rx => {
            let code = code.unwrap_or(crate::domain::message::ABNORMAL_CLOSURE);
            if inner.closed.load(Ordering::SeqCst) {
                return Rotation::Terminal;
            }
            if code == GOING_AWAY {
                info!("server sent going-away, shutting down");
                return Rotation::Terminal;
            }
            debug!(code, "transport closed by host");
            let _ = inner.events.send(ClientEvent::HostClosed);
            Rotation::Reconnect
        }
        _ = &mut drain_tick => {
            debug!("drain interval elapsed, rotating transport");
            let _ = inner.events.send(ClientEvent::Reconnecting);
            let draining: HashSet<String> = inner
                .pending
                .lock()
                .unwrap()
                .values()
                .filter(|entry| entry.epoch == epoch)
                .map(|entry| entry.request.id.clone())
                .collect();
            if draining.is_empty() {
                let _ = outbound.send(Outbound::Close(GOING_AWAY)).await;
            } else {
                debug!(pending = draining.len(), "old transport drains before closing");
                inner.drains.lock().unwrap().push(DrainState {
                    ids: draining,
                    outbound: outbound.clone(),
                });
            }
            Rotation::Reconnect
        }
        _ = inner.recycle.notified() => {
            warn!("timeout tolerance exceeded, recycling transport");
            let _ = inner.events.send(ClientEvent::HostClosed);
            let _ = outbound.send(Outbound::Close(SERVER_SHUTTING_OFF)).await;
            Rotation::Reconnect
        }
    }
}

/// Consume one socket's events: resolve replies, surface pushes, and report
/// the close code back to the lifecycle.
async fn run_reader(
    inner: Arc<ClientInner>,
    mut events: mpsc::Receiver<SocketEvent>,
    outbound: mpsc::Sender<Outbound>,
    closed_tx: oneshot::Sender<u16>,
) {
    let mut close_code = crate::domain::message::ABNORMAL_CLOSURE;
    while let Some(event) = events.recv().await {
        match event {
            SocketEvent::Message(text) => match Message::from_json(&text) {
                Ok(Message::Ok(reply)) => {
                    settle(&inner, &reply.id, Ok(reply.payload)).await;
                }
                Ok(Message::Err(reply)) => {
                    settle(&inner, &reply.id, Err(reply.error)).await;
                }
                Ok(Message::Push(push)) => {
                    let _ = inner.pushes.send(push);
                }
                Ok(Message::Request(_)) => {
                    debug!("ignoring request frame from server");
                }
                Err(e) => {
                    warn!(error = %e, "closing transport after malformed frame");
                    let _ = inner.events.send(ClientEvent::Error(e.to_string()));
                    let _ = outbound.send(Outbound::Close(PROTOCOL_ERROR)).await;
                }
            },
            SocketEvent::Error(e) => {
                error!(error = %e, "transport error");
                let _ = inner.events.send(ClientEvent::Error(e));
            }
            SocketEvent::Closed(code) => {
                close_code = code;
                break;
            }
        }
    }
    let _ = closed_tx.send(close_code);
}

/// Deliver a terminal outcome for `id`, if it is still pending, and advance
/// every draining transport waiting on it. A drained transport closes with
/// GOING_AWAY no matter which transport delivered the last reply.
async fn settle(inner: &Arc<ClientInner>, id: &str, outcome: ReplyOutcome) {
    let entry = inner.pending.lock().unwrap().remove(id);
    match entry {
        Some(entry) => {
            let _ = entry.responder.send(outcome);
        }
        // Retired by timeout, or answered on another transport.
        None => debug!(id, "dropping reply for unknown id"),
    }
    let drained: Vec<mpsc::Sender<Outbound>> = {
        let mut drains = inner.drains.lock().unwrap();
        for drain in drains.iter_mut() {
            drain.ids.remove(id);
        }
        let mut finished = Vec::new();
        drains.retain(|drain| {
            if drain.outbound.is_closed() {
                return false;
            }
            if drain.ids.is_empty() {
                finished.push(drain.outbound.clone());
                return false;
            }
            true
        });
        finished
    };
    for outbound in drained {
        debug!("drained transport closing");
        let _ = outbound.send(Outbound::Close(GOING_AWAY)).await;
    }
}

/// Retransmit pending requests that went out on an older, now-gone
/// transport, rewriting their entries to the new epoch. Two kinds of entries
/// are left alone so each attempt produces exactly one transmission: entries
/// never transmitted (epoch 0), whose suspended `transmit` call sends them
/// once the latch opens, and entries draining on a still-open rotated
/// transport, which that transport is expected to answer. Timers keep
/// running; only the transport changes underneath them.
async fn resling(inner: &Arc<ClientInner>, epoch: u64, outbound: &mpsc::Sender<Outbound>) {
    let draining: HashSet<String> = {
        let drains = inner.drains.lock().unwrap();
        drains
            .iter()
            .flat_map(|drain| drain.ids.iter().cloned())
            .collect()
    };
    let stale: Vec<Request> = {
        let mut pending = inner.pending.lock().unwrap();
        pending
            .values_mut()
            .filter(|entry| {
                entry.epoch > 0
                    && entry.epoch < epoch
                    && !draining.contains(&entry.request.id)
            })
            .map(|entry| {
                entry.epoch = epoch;
                entry.request.clone()
            })
            .collect()
    };
    if stale.is_empty() {
        return;
    }
    debug!(count = stale.len(), "re-dispatching pending requests");
    for request in stale {
        match Message::Request(request).to_json() {
            Ok(text) => {
                let _ = outbound.send(Outbound::Text(text)).await;
            }
            Err(e) => error!(error = %e, "failed to encode pending request"),
        }
    }
}

/// Watch the timeout ratio over each tolerance window and recycle the
/// transport when it trips. Counters reset at every window boundary unless
/// the trip fires.
async fn run_tolerance(inner: Arc<ClientInner>) {
    let mut window = tokio::time::interval(inner.options.tolerance.interval);
    window.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    window.tick().await;
    loop {
        window.tick().await;
        if inner.closed.load(Ordering::SeqCst) {
            break;
        }
        let tripped = {
            let mut stats = inner.stats.lock().unwrap();
            if stats.requests > 0
                && stats.timeouts as f64 / stats.requests as f64 > inner.options.tolerance.ratio
            {
                true
            } else {
                stats.requests = 0;
                stats.timeouts = 0;
                false
            }
        };
        if tripped && *inner.opened.borrow() != 0 {
            inner.recycle.notify_one();
        }
    }
}
