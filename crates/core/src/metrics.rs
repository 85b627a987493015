//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Channel cycles and per-item outcomes
//! - Notification delivery and summarization attempts
//! - Circuit breaker transitions and the shared quota budget
//! - External service calls (content source, LLM, messaging)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Cycle Metrics
// =============================================================================

/// Channel cycles by outcome.
pub static CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("herald_cycles_total", "Total channel cycles"),
        &["outcome"], // "completed", "failed", "deferred", "circuit_open", "deactivated", "aborted"
    )
    .unwrap()
});

/// Channel cycle duration in seconds.
pub static CYCLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("herald_cycle_duration_seconds", "Duration of channel cycles")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Items reaching a terminal status.
pub static ITEMS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("herald_items_processed_total", "Items reaching a terminal status"),
        &["status"], // "notified", "failed"
    )
    .unwrap()
});

// =============================================================================
// Delivery Metrics
// =============================================================================

/// Notification deliveries by result.
pub static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("herald_notifications_total", "Notification delivery results"),
        &["result"], // "delivered", "failed", "already_delivered"
    )
    .unwrap()
});

/// Message chunks sent to the messaging endpoint.
pub static MESSAGE_CHUNKS_SENT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("herald_message_chunks_sent_total", "Total message chunks sent").unwrap()
});

/// Summarizer attempts by result.
pub static SUMMARIZER_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("herald_summarizer_attempts_total", "Summarization attempts"),
        &["result"], // "success", "retryable", "terminal"
    )
    .unwrap()
});

// =============================================================================
// Circuit Breaker and Quota Metrics
// =============================================================================

/// Circuit transitions by target state.
pub static CIRCUIT_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("herald_circuit_transitions_total", "Circuit breaker transitions"),
        &["state"], // "open", "half_open", "closed"
    )
    .unwrap()
});

/// Source calls refused by the quota budget.
pub static QUOTA_DEFERRALS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "herald_quota_deferrals_total",
        "Source calls deferred for lack of quota",
    )
    .unwrap()
});

/// Quota units consumed.
pub static QUOTA_UNITS_CONSUMED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("herald_quota_units_consumed_total", "Quota units consumed").unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "herald_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "herald_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Record the duration and status of one external call.
pub fn observe_external(service: &str, operation: &str, started: std::time::Instant, ok: bool) {
    EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, operation])
        .observe(started.elapsed().as_secs_f64());
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, if ok { "success" } else { "error" }])
        .inc();
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Cycles
        Box::new(CYCLES_TOTAL.clone()),
        Box::new(CYCLE_DURATION.clone()),
        Box::new(ITEMS_PROCESSED.clone()),
        // Delivery
        Box::new(NOTIFICATIONS_TOTAL.clone()),
        Box::new(MESSAGE_CHUNKS_SENT.clone()),
        Box::new(SUMMARIZER_ATTEMPTS.clone()),
        // Circuit and quota
        Box::new(CIRCUIT_TRANSITIONS.clone()),
        Box::new(QUOTA_DEFERRALS.clone()),
        Box::new(QUOTA_UNITS_CONSUMED.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}
