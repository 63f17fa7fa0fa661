//! HTTP server adapter: the stateless request/response variant.
//!
//! Each `POST /api/{task_type}` is a one-shot request: the body is the
//! payload, the response is the reply. There is no push and no stale
//! handling on this path. The server also exposes the healthcheck and an
//! admin endpoint that severs every live WebSocket connection.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::adapter::error::HttpServerError;
use crate::application::processor::RequestProcessor;
use crate::application::schema::Schema;
use crate::domain::error::{TaskError, TaskWireError};
use crate::domain::message::{Request, SERVER_SHUTTING_OFF};
use crate::port::handler::Healthcheck;
use crate::port::middleware::Middleware;
use crate::services::server::ConnectionRegistry;

/// HTTP server for the taskwire protocol.
pub struct HttpServer {
    processor: Arc<RequestProcessor>,
    registry: Option<ConnectionRegistry>,
    shutdown: Arc<Notify>,
    serve_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl HttpServer {
    /// Create a server dispatching to `schema`.
    pub fn new(schema: Schema) -> Self {
        Self::with_processor(Arc::new(RequestProcessor::new(schema)))
    }

    /// Create a server around an existing processor, e.g. one shared with a
    /// [`WebSocketServer`](crate::adapter::WebSocketServer).
    pub fn with_processor(processor: Arc<RequestProcessor>) -> Self {
        Self {
            processor,
            registry: None,
            shutdown: Arc::new(Notify::new()),
            serve_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Install the healthcheck behind `GET /healthcheck` and `$PING`.
    pub fn with_healthcheck(self, healthcheck: impl Healthcheck + 'static) -> Self {
        self.processor.set_healthcheck(healthcheck);
        self
    }

    /// Attach a WebSocket connection registry so `GET /disconnect` can sever
    /// live connections.
    pub fn with_connections(mut self, registry: ConnectionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Append a middleware to the dispatch chain.
    pub fn use_middleware(&self, middleware: impl Middleware + 'static) {
        self.processor.use_middleware(middleware);
    }

    /// The bound address, once `listen` has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap()
    }

    /// Bind `addr` and start serving in a background task.
    #[instrument(skip(self), fields(server.addr = %addr))]
    pub async fn listen(&self, addr: &str) -> Result<(), TaskWireError> {
        let app = Router::new()
            .route("/api/{task_type}", post(handle_task))
            .route("/healthcheck", get(handle_healthcheck))
            .route("/disconnect", get(handle_disconnect))
            .with_state(ServerState {
                processor: self.processor.clone(),
                registry: self.registry.clone(),
            });

        let listener = TcpListener::bind(addr).await.map_err(HttpServerError::Io)?;
        let local_addr = listener.local_addr().map_err(HttpServerError::Io)?;
        *self.local_addr.lock().unwrap() = Some(local_addr);
        info!(%local_addr, "HTTP server listening");

        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        });
        *self.serve_task.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Stop serving.
    pub async fn close(&self) {
        info!("closing HTTP server");
        self.shutdown.notify_waiters();
        let task = self.serve_task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

#[derive(Clone)]
struct ServerState {
    processor: Arc<RequestProcessor>,
    registry: Option<ConnectionRegistry>,
}

/// `POST /api/{task_type}`: body is the payload, response is the reply.
/// ERR replies map to `error.code` when it is a valid status, else 500.
async fn handle_task(
    State(state): State<ServerState>,
    Path(task_type): Path<String>,
    payload: Option<Json<Value>>,
) -> impl IntoResponse {
    let payload = payload.map(|Json(value)| value).unwrap_or(Value::Null);
    let request = Request::new(task_type, Uuid::new_v4().to_string(), payload);
    debug!(task_type = %request.task_type, id = %request.id, "dispatching HTTP request");
    match state.processor.dispatch(request).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(error) => error_response(error),
    }
}

/// `GET /healthcheck`: 200 with the healthcheck result, or its error status.
async fn handle_healthcheck(State(state): State<ServerState>) -> impl IntoResponse {
    match state.processor.healthcheck().await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(error) => error_response(error),
    }
}

/// `GET /disconnect`: admin endpoint, closes every live WebSocket connection.
async fn handle_disconnect(State(state): State<ServerState>) -> impl IntoResponse {
    if let Some(registry) = &state.registry {
        let count = registry.len().await;
        info!(count, "disconnecting all connections");
        registry.close_all(SERVER_SHUTTING_OFF).await;
    }
    StatusCode::OK
}

fn error_response(error: TaskError) -> axum::response::Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error.to_value())).into_response()
}
