//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Herald server:
//! - HTTP request metrics (latency, counts)
//! - Channel health and scheduler occupancy (collected dynamically)
//! - The quota budget (collected dynamically)
//!
//! Pipeline counters live in `herald_core::metrics` and are registered here.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tracing::warn;

use herald_core::ChannelHealth;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "herald_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("herald_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "herald_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Tracker Metrics (collected dynamically)
// =============================================================================

/// Channels by operator-facing health.
pub static CHANNELS_BY_HEALTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("herald_channels", "Current channel count by health"),
        &["health"], // "active", "circuit-open", "deactivated"
    )
    .unwrap()
});

/// Scheduler running state (1 = running, 0 = stopped).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "herald_scheduler_running",
        "Whether the scheduler is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Workers currently running a cycle.
pub static SCHEDULER_WORKERS_BUSY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "herald_scheduler_workers_busy",
        "Number of workers currently running a channel cycle",
    )
    .unwrap()
});

/// Quota units left in the current window.
pub static QUOTA_REMAINING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "herald_quota_remaining",
        "Content source quota units left in the current window",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Tracker
    registry
        .register(Box::new(CHANNELS_BY_HEALTH.clone()))
        .unwrap();
    registry
        .register(Box::new(SCHEDULER_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(SCHEDULER_WORKERS_BUSY.clone()))
        .unwrap();
    registry.register(Box::new(QUOTA_REMAINING.clone())).unwrap();

    // Core metrics (cycles, deliveries, circuit, quota, external services)
    for metric in herald_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// This is called before encoding metrics to update gauges with current values
/// from the scheduler, the quota budget and the channel table.
pub fn collect_dynamic_metrics(state: &AppState) {
    let service = state.service();

    let scheduler = service.scheduler().status();
    SCHEDULER_RUNNING.set(if scheduler.running { 1 } else { 0 });
    SCHEDULER_WORKERS_BUSY
        .set(scheduler.worker_pool_size.saturating_sub(scheduler.available_workers) as i64);

    match service.overview() {
        Ok(overview) => {
            QUOTA_REMAINING.set(overview.quota.remaining as i64);
            for (health, count) in [
                (ChannelHealth::Active, overview.channels_active),
                (ChannelHealth::CircuitOpen, overview.channels_circuit_open),
                (ChannelHealth::Deactivated, overview.channels_deactivated),
            ] {
                CHANNELS_BY_HEALTH
                    .with_label_values(&[health.as_str()])
                    .set(count as i64);
            }
        }
        Err(e) => warn!("Failed to collect channel metrics: {}", e),
    }
}

/// Normalize a path for metric labels (replace channel ids with a placeholder).
pub fn normalize_path(path: &str) -> String {
    static CHANNEL_ID: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"^(/api/v1/channels/)[^/]+").unwrap());

    CHANNEL_ID.replace(path, "${1}{id}").to_string()
}
