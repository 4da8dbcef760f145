//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Submissions and session outcomes
//! - The organization pipeline (duration, moves, episode lookups)
//! - External services (metadata source, media server)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Sessions
// =============================================================================

/// Submissions by result.
pub static SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("shelfie_submissions_total", "Total download submissions"),
        &["result"], // "accepted", "duplicate", "limit_reached", "invalid", "engine_error"
    )
    .unwrap()
});

/// Sessions that reached a terminal state.
pub static SESSIONS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "shelfie_sessions_finished_total",
            "Sessions that reached a terminal state",
        ),
        &["state"], // "done", "failed", "cancelled"
    )
    .unwrap()
});

/// Sessions currently queued, downloading or organizing.
pub static ACTIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("shelfie_active_sessions", "Number of active download sessions").unwrap()
});

// =============================================================================
// Organization pipeline
// =============================================================================

/// Organize pipeline duration in seconds.
pub static ORGANIZE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "shelfie_organize_duration_seconds",
            "Time from download completion to library placement",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]),
        &["kind"], // "movie", "tv_episode", "unknown"
    )
    .unwrap()
});

/// File moves by strategy.
pub static MOVES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("shelfie_moves_total", "Files moved into the library"),
        &["strategy"], // "renamed", "copied", "already_placed", "failed"
    )
    .unwrap()
});

/// Episode title lookups by outcome.
pub static RESOLVER_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "shelfie_episode_lookups_total",
            "Episode title lookups by outcome",
        ),
        &["outcome"], // "resolved", "unresolved"
    )
    .unwrap()
});

/// Library rescan requests by outcome.
pub static NOTIFIER_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "shelfie_library_notifications_total",
            "Media server rescan requests by outcome",
        ),
        &["library", "outcome"], // outcome: "ok", "unreachable", "rejected"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "shelfie_external_service_duration_seconds",
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
            "shelfie_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Sessions
        Box::new(SUBMISSIONS.clone()),
        Box::new(SESSIONS_FINISHED.clone()),
        Box::new(ACTIVE_SESSIONS.clone()),
        // Pipeline
        Box::new(ORGANIZE_DURATION.clone()),
        Box::new(MOVES.clone()),
        Box::new(RESOLVER_OUTCOMES.clone()),
        Box::new(NOTIFIER_OUTCOMES.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}

/// Record one external call.
pub fn record_external_call(service: &str, operation: &str, elapsed_secs: f64, success: bool) {
    EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, operation])
        .observe(elapsed_secs);
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, if success { "success" } else { "error" }])
        .inc();
}
