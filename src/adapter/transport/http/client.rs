//! HTTP client adapter: one-shot dispatch over `POST /api/{task_type}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, StatusCode,
};
use serde_json::Value;
use tracing::debug;

use crate::adapter::error::HttpClientError;
use crate::domain::error::{TaskError, TaskWireError};
use crate::services::client::AsyncTaskClient;

/// HTTP client for the taskwire protocol.
///
/// Each dispatch is an independent POST; there is no connection lifecycle,
/// no retry, and no push on this transport.
pub struct HttpClient {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Fetch `GET /healthcheck`.
    pub async fn healthcheck(&self) -> Result<Value, TaskWireError> {
        let response = self
            .client
            .get(self.endpoint("healthcheck"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(HttpClientError::Reqwest)?;
        let status = response.status();
        let body: Value = response.json().await.map_err(HttpClientError::Reqwest)?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(TaskWireError::Task(
                TaskError::from_value(body).or_code(status.as_u16()),
            ))
        }
    }

    /// Hit `GET /disconnect`, severing every WebSocket connection on the
    /// server.
    pub async fn disconnect_all(&self) -> Result<(), TaskWireError> {
        let response = self
            .client
            .get(self.endpoint("disconnect"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(HttpClientError::Reqwest)?;
        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(HttpClientError::Response {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            }
            .into())
        }
    }
}

#[async_trait]
impl AsyncTaskClient for HttpClient {
    async fn dispatch(&self, task_type: &str, payload: Value) -> Result<Value, TaskWireError> {
        let url = self.endpoint(&format!("api/{task_type}"));
        debug!(%url, "sending HTTP request");
        let response = self
            .client
            .post(url)
            .headers(self.headers())
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(HttpClientError::Reqwest)?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .unwrap_or(Value::Null);
        if status.is_success() {
            Ok(body)
        } else {
            Err(TaskWireError::Task(
                TaskError::from_value(body).or_code(status.as_u16()),
            ))
        }
    }
}
