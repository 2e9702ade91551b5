//! # Request Metrics
//!
//! Request and error counters, kept twice: in-process atomics (always
//! available, used by tests and as the `/metrics` fallback) and `metrics`
//! crate counters exported by the Prometheus recorder when the binary
//! installs one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::counter;

/// Shared metrics state.
#[derive(Debug, Clone)]
pub struct ApiMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Prometheus text rendering of the in-process counters.
    pub fn render(&self) -> String {
        format!(
            "# TYPE mess_http_requests_total counter\nmess_http_requests_total {}\n\
             # TYPE mess_http_errors_total counter\nmess_http_errors_total {}\n",
            self.requests(),
            self.errors()
        )
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware that increments request and error counters.
///
/// The route label is the matched route template, so ids never explode the
/// label space.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().as_str().to_string();

    let response = next.run(request).await;
    let status = response.status();

    if let Some(m) = metrics {
        m.request_count.fetch_add(1, Ordering::Relaxed);
        if status.is_server_error() || status.is_client_error() {
            m.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    let labels = [
        ("method", method),
        ("route", route),
        ("status", status.as_u16().to_string()),
    ];
    counter!("mess_http_requests_total", &labels).increment(1);
    if status.is_server_error() || status.is_client_error() {
        counter!("mess_http_errors_total", &labels).increment(1);
    }

    response
}
