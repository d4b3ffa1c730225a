//! Metrics collection and exposition.
//!
//! # Metrics
//! - `blog_requests_total` (counter): requests by method, status
//! - `blog_request_duration_seconds` (histogram): latency distribution
//! - `blog_rate_limited_total` (counter): denied attempts by action
//! - `blog_auth_rejections_total` (counter): gate rejections by reason
//! - `blog_generation_failures_total` (counter): generator failures by kind

use std::net::SocketAddr;
use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "blog_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("blog_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(action: &str) {
    metrics::counter!("blog_rate_limited_total", "action" => action.to_string()).increment(1);
}

pub fn record_auth_rejection(reason: &'static str) {
    metrics::counter!("blog_auth_rejections_total", "reason" => reason).increment(1);
}

pub fn record_generation_failure(kind: &'static str) {
    metrics::counter!("blog_generation_failures_total", "kind" => kind).increment(1);
}

/// Middleware recording request count and latency.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    record_request(&method, response.status().as_u16(), start);
    response
}
