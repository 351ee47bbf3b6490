//! HTTP transport boundary for the remote commerce platform.
//!
//! All network I/O goes through the [`HttpTransport`] trait so the remote
//! sync service can be exercised in unit tests with an in-memory mock
//! instead of sockets. The production implementation is backed by reqwest.
//!
//! Error classification happens here, once: an HTTP status from the remote
//! platform is mapped to a [`SyncError`] variant and never re-inspected
//! downstream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncError;

/// HTTP methods used by the remote platform API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// A request to the remote platform.
///
/// Bodies are form-encoded key/value pairs, which is what the platform's
/// create endpoints accept; query parameters carry search criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

impl ApiRequest {
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }
}

/// A response from the remote platform.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: serde_json::Value,
}

impl ApiResponse {
    #[must_use]
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body,
        }
    }

    /// Map a non-2xx response to the closed error taxonomy.
    ///
    /// 404 is deliberately `NotFound` (a create trigger for the caller),
    /// 409 is `Conflict` (success via the idempotent lookup path).
    pub fn into_result(self) -> Result<serde_json::Value, SyncError> {
        match self.status {
            200..=299 => Ok(self.body),
            401 | 403 => Err(SyncError::auth(error_detail(&self.body))),
            404 => Err(SyncError::not_found(error_detail(&self.body))),
            409 => Err(SyncError::conflict(error_detail(&self.body))),
            429 => Err(SyncError::RateLimited {
                reset_at: self.retry_after.map(reset_from_retry_after),
            }),
            400 | 422 => Err(SyncError::validation("request", error_detail(&self.body))),
            _ => Err(SyncError::network(format!(
                "unexpected status {}: {}",
                self.status,
                error_detail(&self.body)
            ))),
        }
    }
}

fn error_detail(body: &serde_json::Value) -> String {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("no detail")
        .to_string()
}

fn reset_from_retry_after(secs: u64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(secs as i64)
}

/// Transport boundary for all remote platform I/O.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SyncError>;
}

/// Production transport backed by reqwest, with bearer authentication.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ReqwestTransport {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };

        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_key)
            .query(&request.query);

        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let resp = builder.send().await.map_err(|e| {
            // Connect/timeout failures are transient by definition; anything
            // producing a status code is classified from the status below.
            SyncError::network(e.to_string())
        })?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = resp
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);

        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}

// ---------- Mock transport for tests ----------

pub mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// In-memory mock transport: no sockets, no loopback servers.
    ///
    /// Responses are registered per (method, path) and returned FIFO; every
    /// request is recorded for assertion.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        inner: Arc<Mutex<MockInner>>,
    }

    #[derive(Default)]
    struct MockInner {
        routes: HashMap<(Method, String), VecDeque<ApiResponse>>,
        requests: Vec<ApiRequest>,
    }

    impl MockTransport {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_response(&self, method: Method, path: impl Into<String>, response: ApiResponse) {
            let mut inner = self.inner.lock().expect("mock transport lock poisoned");
            inner
                .routes
                .entry((method, path.into()))
                .or_default()
                .push_back(response);
        }

        #[must_use]
        pub fn requests(&self) -> Vec<ApiRequest> {
            let inner = self.inner.lock().expect("mock transport lock poisoned");
            inner.requests.clone()
        }

        /// Number of requests sent to a given method + path.
        #[must_use]
        pub fn request_count(&self, method: Method, path: &str) -> usize {
            self.requests()
                .iter()
                .filter(|r| r.method == method && r.path == path)
                .count()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
            let mut inner = self.inner.lock().expect("mock transport lock poisoned");
            let key = (request.method, request.path.clone());
            inner.requests.push(request);

            match inner.routes.get_mut(&key).and_then(|q| q.pop_front()) {
                Some(resp) => Ok(resp),
                None => Err(SyncError::internal(format!(
                    "no mock response registered for {} {}",
                    key.0.as_str(),
                    key.1
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;
    use serde_json::json;

    #[test]
    fn status_mapping_covers_the_taxonomy() {
        let err = |status: u16| {
            ApiResponse {
                status,
                retry_after: None,
                body: json!({"error": {"message": "detail"}}),
            }
            .into_result()
            .expect_err("non-2xx should error")
        };

        assert!(matches!(err(401), SyncError::Auth { .. }));
        assert!(matches!(err(403), SyncError::Auth { .. }));
        assert!(matches!(err(404), SyncError::NotFound { .. }));
        assert!(matches!(err(409), SyncError::Conflict { .. }));
        assert!(matches!(err(429), SyncError::RateLimited { .. }));
        assert!(matches!(err(400), SyncError::Validation { .. }));
        assert!(matches!(err(503), SyncError::TransientNetwork { .. }));
    }

    #[test]
    fn ok_response_returns_body() {
        let body = ApiResponse::ok(json!({"id": "prod_1"}))
            .into_result()
            .expect("2xx should succeed");
        assert_eq!(body["id"], "prod_1");
    }

    #[test]
    fn retry_after_populates_reset_at() {
        let err = ApiResponse {
            status: 429,
            retry_after: Some(30),
            body: json!({}),
        }
        .into_result()
        .expect_err("429 should error");

        match err {
            SyncError::RateLimited { reset_at } => {
                let at = reset_at.expect("reset_at should be set");
                assert!(at > Utc::now());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_transport_returns_fifo_responses_and_records_requests() {
        let transport = MockTransport::new();
        transport.push_response(Method::Get, "/v1/products/search", ApiResponse::ok(json!(1)));
        transport.push_response(Method::Get, "/v1/products/search", ApiResponse::ok(json!(2)));

        let req = ApiRequest::get("/v1/products/search").with_query("query", "x");
        let first = transport.send(req.clone()).await.expect("first response");
        let second = transport.send(req.clone()).await.expect("second response");

        assert_eq!(first.body, json!(1));
        assert_eq!(second.body, json!(2));
        assert_eq!(transport.request_count(Method::Get, "/v1/products/search"), 2);
        assert_eq!(transport.requests()[0].query, vec![("query".to_string(), "x".to_string())]);
    }

    #[tokio::test]
    async fn mock_transport_errors_without_registered_response() {
        let transport = MockTransport::new();
        let err = transport
            .send(ApiRequest::post("/v1/products"))
            .await
            .expect_err("missing mock should error");
        assert!(matches!(err, SyncError::Internal { .. }));
    }

    #[test]
    fn request_builder_accumulates_query_and_form() {
        let req = ApiRequest::post("/v1/prices")
            .with_form("unit_amount", "2550")
            .with_form("currency", "usd")
            .with_query("expand", "product");

        assert_eq!(req.form.len(), 2);
        assert_eq!(req.query.len(), 1);
        assert_eq!(req.method.as_str(), "POST");
    }
}
