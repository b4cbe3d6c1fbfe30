use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Metric name prefix for all gateway metrics
const PREFIX: &str = "ds_gateway";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Gateway Metrics
    pub static ref AUTH_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_auth_failures_total"), "Rejected credentials by reason"),
        &["reason"]
    ).expect("Failed to create auth_failures_total metric");

    pub static ref RATE_LIMIT_HITS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_rate_limit_hits_total"), "Rate limit violations"),
        &["tier"]
    ).expect("Failed to create rate_limit_hits_total metric");

    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Error responses by type"),
        &["error_type"]
    ).expect("Failed to create errors_total metric");

    // MCP Metrics
    pub static ref MCP_SESSIONS_OPENED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_mcp_sessions_opened_total"), "Protocol sessions opened"),
        &["mode"]
    ).expect("Failed to create mcp_sessions_opened_total metric");

    pub static ref MCP_SESSIONS_ACTIVE: IntGauge = IntGauge::new(
        format!("{PREFIX}_mcp_sessions_active"),
        "Protocol sessions currently open"
    ).expect("Failed to create mcp_sessions_active metric");

    pub static ref MCP_TOOL_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_mcp_tool_calls_total"), "Tool calls by tool and outcome"),
        &["tool", "outcome"]
    ).expect("Failed to create mcp_tool_calls_total metric");

    // Catalog Metrics
    pub static ref CATALOG_ITEMS_TOTAL: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_items_total"), "Total items in catalog"),
        &["type"]
    ).expect("Failed to create catalog_items_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(AUTH_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RATE_LIMIT_HITS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MCP_SESSIONS_OPENED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MCP_SESSIONS_ACTIVE.clone()));
    let _ = REGISTRY.register(Box::new(MCP_TOOL_CALLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ITEMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::debug!("Metrics system initialized");
}

pub fn init_catalog_metrics(num_components: usize, num_tokens: usize) {
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["component"])
        .set(num_components as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["token"])
        .set(num_tokens as f64);
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_auth_failure(reason: &str) {
    AUTH_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a rate limit hit
pub fn record_rate_limit_hit(tier: &str) {
    RATE_LIMIT_HITS_TOTAL.with_label_values(&[tier]).inc();
}

/// Record an error response
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

pub fn record_session_opened(mode: &str) {
    MCP_SESSIONS_OPENED_TOTAL.with_label_values(&[mode]).inc();
    MCP_SESSIONS_ACTIVE.inc();
}

pub fn record_session_closed() {
    MCP_SESSIONS_ACTIVE.dec();
}

pub fn record_tool_call(tool: &str, outcome: &str) {
    MCP_TOOL_CALLS_TOTAL.with_label_values(&[tool, outcome]).inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = rss_kb {
                PROCESS_MEMORY_BYTES.set(kb * 1024.0);
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serves `/metrics` on its own listener until `shutdown` fires.
pub async fn serve_metrics(addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {}", addr))?;
    info!("Metrics available at http://{}/metrics", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Metrics server failed")
}
