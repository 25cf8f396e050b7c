// ────────────────────────────────
// src/proxy/proxy.rs
// HTTP-facing front of the dispatcher: prefix matching, request ids,
// metrics and error responses.
// ────────────────────────────────

use super::Dispatcher;
use crate::metrics::{MetricsCollector, Timer};
use hyper::header::HeaderValue;
use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

const X_REQUEST_ID: &str = "x-request-id";

pub struct Proxy {
    dispatcher: Arc<Dispatcher>,
    prefix: String,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Proxy {
    pub fn new(dispatcher: Arc<Dispatcher>, prefix: impl Into<String>) -> Self {
        Self {
            dispatcher,
            prefix: prefix.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        metrics.update_backend_count(self.dispatcher.backends().len());
        self.metrics = Some(metrics);
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serve one request. Failures are turned into error responses.
    pub async fn handle(&self, mut req: Request<Body>) -> Response<Body> {
        let client_id = req
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|id| id.to_str().ok())
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        // Unreadable client ids are replaced so logs and backend agree.
        let request_id = match client_id {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    req.headers_mut().insert(X_REQUEST_ID, value);
                }
                id
            }
        };

        let method = req.method().to_string();
        let span = info_span!(
            "request",
            id = %request_id,
            method = %method,
            path = %req.uri().path()
        );

        self.serve(req, &method).instrument(span).await
    }

    async fn serve(&self, req: Request<Body>, method: &str) -> Response<Body> {
        let timer = Timer::new();

        if !matches_prefix(&self.prefix, req.uri().path()) {
            return self.reject(ProxyError::NotFound);
        }

        match self.dispatcher.handle(req).await {
            Ok(dispatched) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_request(
                        method,
                        dispatched.response.status().as_u16(),
                        &dispatched.backend.id,
                        timer.elapsed(),
                    );
                }
                dispatched.response
            }
            Err(e) => self.reject(e),
        }
    }

    fn reject(&self, err: ProxyError) -> Response<Body> {
        match &err {
            ProxyError::NotFound | ProxyError::InvalidRequest(_) => warn!(%err, "request rejected"),
            _ => error!(%err, "proxy error"),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_rejection(err.reason());
        }

        err.into()
    }
}

/// A prefix ending in `/` matches its subtree, anything else only itself.
fn matches_prefix(prefix: &str, path: &str) -> bool {
    if prefix.ends_with('/') {
        path.starts_with(prefix)
    } else {
        path == prefix
    }
}

// Custom error type for proxy operations
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("need at least one backend to proxy to")]
    InvalidConfiguration,

    #[error("{url} is not a valid backend URL: {reason}")]
    MalformedBackendUrl { url: String, reason: String },

    #[error("proxy is shutting down")]
    SchedulerClosed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no route for request path")]
    NotFound,

    #[error("rewritten URL is not a valid request URI")]
    InvalidUri,

    #[error("backend error: {0}")]
    Backend(#[from] hyper::Error),
}

impl ProxyError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ProxyError::InvalidConfiguration => "invalid_configuration",
            ProxyError::MalformedBackendUrl { .. } => "malformed_backend_url",
            ProxyError::SchedulerClosed => "shutting_down",
            ProxyError::InvalidRequest(_) => "invalid_request",
            ProxyError::NotFound => "not_found",
            ProxyError::InvalidUri => "invalid_uri",
            ProxyError::Backend(_) => "backend_error",
        }
    }
}

// Convert ProxyError to Hyper Response for error handling
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let (status, message) = match err {
            ProxyError::SchedulerClosed => (StatusCode::SERVICE_UNAVAILABLE, "Proxy shutting down"),
            ProxyError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
            ProxyError::NotFound => (StatusCode::NOT_FOUND, "Not found"),
            ProxyError::InvalidUri | ProxyError::Backend(_) => (StatusCode::BAD_GATEWAY, "Bad gateway"),
            ProxyError::InvalidConfiguration | ProxyError::MalformedBackendUrl { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = status;
        response
    }
}
