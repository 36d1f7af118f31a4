use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::extract::{MatchedPath, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use super::state::AppState;

/// Global metrics registry
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// All application metrics
pub struct Metrics {
    // Config distribution
    pub config_requests: IntCounterVec,
    pub config_errors: IntCounterVec,
    pub override_total: IntCounterVec,
    pub cached_environments: IntGauge,

    // Backup generation
    pub backup_total: IntCounterVec,
    pub backup_duration: Histogram,
    pub backup_upload_total: IntCounterVec,
    pub backup_sql_bytes: IntGauge,

    // HTTP request metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

impl Metrics {
    fn new(registry: &Registry) -> Self {
        let config_requests = IntCounterVec::new(
            Opts::new(
                "vg_config_requests_total",
                "Total config document requests by environment and cache outcome",
            ),
            &["environment", "cache"],
        )
        .expect("failed to create config_requests metric");

        let config_errors = IntCounterVec::new(
            Opts::new(
                "vg_config_resolve_errors_total",
                "Total failed config resolutions",
            ),
            &["environment"],
        )
        .expect("failed to create config_errors metric");

        let override_total = IntCounterVec::new(
            Opts::new("vg_override_total", "Total admin override applications"),
            &["status"],
        )
        .expect("failed to create override_total metric");

        let cached_environments = IntGauge::new(
            "vg_cached_environments",
            "Number of environments with a cached config document",
        )
        .expect("failed to create cached_environments metric");

        let backup_total = IntCounterVec::new(
            Opts::new("vg_backup_total", "Total backup generation runs"),
            &["status"],
        )
        .expect("failed to create backup_total metric");

        let backup_duration = Histogram::with_opts(
            HistogramOpts::new(
                "vg_backup_duration_seconds",
                "Duration of backup generation runs",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]),
        )
        .expect("failed to create backup_duration metric");

        let backup_upload_total = IntCounterVec::new(
            Opts::new("vg_backup_upload_total", "Total backup storage uploads"),
            &["status"],
        )
        .expect("failed to create backup_upload_total metric");

        let backup_sql_bytes = IntGauge::new(
            "vg_backup_sql_bytes",
            "Size of the most recently generated backup in bytes",
        )
        .expect("failed to create backup_sql_bytes metric");

        let http_requests_total = IntCounterVec::new(
            Opts::new("vg_http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )
        .expect("failed to create http_requests_total metric");

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "vg_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["method", "path"],
        )
        .expect("failed to create http_request_duration metric");

        registry
            .register(Box::new(config_requests.clone()))
            .expect("register config_requests");
        registry
            .register(Box::new(config_errors.clone()))
            .expect("register config_errors");
        registry
            .register(Box::new(override_total.clone()))
            .expect("register override_total");
        registry
            .register(Box::new(cached_environments.clone()))
            .expect("register cached_environments");
        registry
            .register(Box::new(backup_total.clone()))
            .expect("register backup_total");
        registry
            .register(Box::new(backup_duration.clone()))
            .expect("register backup_duration");
        registry
            .register(Box::new(backup_upload_total.clone()))
            .expect("register backup_upload_total");
        registry
            .register(Box::new(backup_sql_bytes.clone()))
            .expect("register backup_sql_bytes");
        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("register http_requests_total");
        registry
            .register(Box::new(http_request_duration.clone()))
            .expect("register http_request_duration");

        Self {
            config_requests,
            config_errors,
            override_total,
            cached_environments,
            backup_total,
            backup_duration,
            backup_upload_total,
            backup_sql_bytes,
            http_requests_total,
            http_request_duration,
        }
    }
}

/// Get the global metrics instance, initializing on first call
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let registry = REGISTRY.get_or_init(Registry::new);
        Metrics::new(registry)
    })
}

/// Axum handler for GET /metrics — returns Prometheus text format
pub async fn handle_metrics() -> Response {
    // Ensure all metric collectors are registered on first call.
    let _ = metrics();
    let registry = REGISTRY.get_or_init(Registry::new);
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("encode metrics");
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Axum handler for GET /readyz — ready once the service is constructed.
pub async fn handle_readyz(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "ready": true,
            "cached_environments": state.runtime.cached_environments(),
            "storage_configured": state.backups.storage_configured(),
        })),
    )
        .into_response()
}

/// Axum middleware that records HTTP request count and duration.
pub async fn track_metrics(request: Request<axum::body::Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let m = metrics();
    m.http_requests_total
        .with_label_values(&[&method, &path, &status])
        .inc();
    m.http_request_duration
        .with_label_values(&[&method, &path])
        .observe(elapsed);

    response
}
