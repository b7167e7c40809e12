//! gRPC request metrics and the Prometheus HTTP endpoint

use anyhow::Result;
use axum::http::{StatusCode, header};
use axum::{Router, response::Response, routing::get};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts};
use prometheus::{register_histogram_vec, register_int_counter_vec};
use std::net::SocketAddr;
use std::sync::{Mutex, OnceLock};
use tracing::info;

struct GrpcMetrics {
    requests: IntCounterVec,
    duration: HistogramVec,
}

static GRPC_METRICS: OnceLock<GrpcMetrics> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Register the keeper metrics with the default registry. Safe to call more
/// than once; later calls are no-ops.
pub fn init_metrics() -> Result<()> {
    let _lock = INIT_LOCK
        .lock()
        .map_err(|_| anyhow::anyhow!("Metrics initialization lock poisoned"))?;
    if GRPC_METRICS.get().is_some() {
        return Ok(());
    }

    let requests = register_int_counter_vec!(
        Opts::new("keeper_grpc_requests_total", "Total number of gRPC requests"),
        &["method", "code"]
    )?;

    let duration = register_histogram_vec!(
        HistogramOpts::new(
            "keeper_grpc_request_duration_seconds",
            "Duration of gRPC requests"
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0]),
        &["method", "code"]
    )?;

    GRPC_METRICS
        .set(GrpcMetrics { requests, duration })
        .map_err(|_| anyhow::anyhow!("Failed to store gRPC metrics"))?;

    info!("Metrics initialized");
    Ok(())
}

/// Record one finished gRPC call. No-op until [`init_metrics`] has run.
pub fn record_grpc_request(method: &str, code: &str, duration_seconds: f64) {
    if let Some(metrics) = GRPC_METRICS.get() {
        metrics.requests.with_label_values(&[method, code]).inc();
        metrics
            .duration
            .with_label_values(&[method, code])
            .observe(duration_seconds);
    }
}

pub fn create_metrics_server() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Start metrics HTTP server
pub async fn start_metrics_server(addr: SocketAddr) -> Result<()> {
    let app = create_metrics_server();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Started metrics server on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> Result<Response<String>, StatusCode> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();

    let metrics = encoder
        .encode_to_string(&metric_families)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(metrics)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
