//! Metrics for the freight quoting service.
//!
//! - Prometheus recorder installation and the `/metrics` handler
//! - Quote engine metrics ([`QuoteMetrics`])
//! - Axum middleware for per-route request metrics
//!
//! ```rust,ignore
//! use axum::{middleware, routing::get, Router};
//! use observability::{init_metrics, metrics_handler, middleware::metrics_middleware};
//!
//! init_metrics();
//! let app = Router::new()
//!     .route("/metrics", get(metrics_handler))
//!     .layer(middleware::from_fn(metrics_middleware));
//! ```

pub mod middleware;
pub mod quotes;

pub use quotes::QuoteMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{error, info};

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder once per process.
///
/// Returns `None` when another recorder was installed first; metrics
/// macros then report to that recorder and `/metrics` renders nothing.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Some(handle);
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics recorder initialized");
            register_metric_descriptions();
            Some(METRICS_HANDLE.get_or_init(|| handle))
        }
        Err(e) => {
            error!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for /metrics endpoint
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP requests answered with 4xx or 5xx"
    );

    describe_counter!(
        "freight_quotes_total",
        "Freight quotes by selection mode and outcome"
    );
    describe_histogram!(
        "freight_quote_duration_seconds",
        "Freight quote computation time in seconds"
    );
    describe_counter!(
        "freight_candidate_failures_total",
        "Crossing points dropped from a comparison, by reason"
    );
    describe_counter!(
        "freight_distance_fallbacks_total",
        "Distance lookups that degraded to a zero distance"
    );
    describe_counter!(
        "freight_exchange_rate_source_total",
        "Exchange rate snapshots served, by source"
    );
}
