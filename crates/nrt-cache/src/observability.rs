//! Observability infrastructure for the topology cache
//!
//! Provides:
//! - Prometheus metrics (reservations, duplicate events, overlay anomalies,
//!   fingerprint verdicts, flushes)
//! - Structured logging of cache events with tracing

use crate::fingerprint::FingerprintStatus;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for overlay latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    reservations: IntGauge,
    duplicate_events: IntCounterVec,
    negative_available: IntCounter,
    fingerprint_checks: IntCounterVec,
    flushed_nodes: IntCounter,
    stale_escalations: IntCounter,
    overlay_latency_seconds: Histogram,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            reservations: register_int_gauge!(
                "nrt_cache_reservations",
                "Number of in-flight workload reservations not yet reflected in topology reports"
            )
            .expect("Failed to register reservations"),

            duplicate_events: register_int_counter_vec!(
                "nrt_cache_duplicate_events_total",
                "Workload add/delete events that hit an already-present (or already-absent) reservation",
                &["operation"]
            )
            .expect("Failed to register duplicate_events"),

            negative_available: register_int_counter!(
                "nrt_cache_negative_available_total",
                "Zone resources driven below zero by the reservation overlay"
            )
            .expect("Failed to register negative_available"),

            fingerprint_checks: register_int_counter_vec!(
                "nrt_cache_fingerprint_checks_total",
                "Fingerprint comparisons by outcome",
                &["result"]
            )
            .expect("Failed to register fingerprint_checks"),

            flushed_nodes: register_int_counter!(
                "nrt_cache_flushed_nodes_total",
                "Nodes whose cached topology was replaced by a verified report"
            )
            .expect("Failed to register flushed_nodes"),

            stale_escalations: register_int_counter!(
                "nrt_cache_stale_escalations_total",
                "Nodes that exceeded the stale flush attempt limit"
            )
            .expect("Failed to register stale_escalations"),

            overlay_latency_seconds: register_histogram!(
                "nrt_cache_overlay_latency_seconds",
                "Time spent applying the reservation overlay to a snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register overlay_latency_seconds"),
        }
    }
}

/// Cache metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct CacheMetrics {
    _private: (),
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetrics").finish_non_exhaustive()
    }
}

impl CacheMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CacheMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CacheMetricsInner {
        GLOBAL_METRICS.get_or_init(CacheMetricsInner::new)
    }

    pub fn inc_reservations(&self) {
        self.inner().reservations.inc();
    }

    pub fn sub_reservations(&self, count: i64) {
        self.inner().reservations.sub(count);
    }

    /// Count an add/delete that found the store already in the target state
    pub fn inc_duplicate_event(&self, operation: &str) {
        self.inner()
            .duplicate_events
            .with_label_values(&[operation])
            .inc();
    }

    pub fn inc_negative_available(&self) {
        self.inner().negative_available.inc();
    }

    /// Record a fingerprint verdict ("consistent", "stale", "unverified")
    pub fn inc_fingerprint_check(&self, status: FingerprintStatus) {
        self.inner()
            .fingerprint_checks
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn inc_flushed_nodes(&self) {
        self.inner().flushed_nodes.inc();
    }

    pub fn inc_stale_escalations(&self) {
        self.inner().stale_escalations.inc();
    }

    pub fn observe_overlay_latency(&self, duration_secs: f64) {
        self.inner().overlay_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for cache events
///
/// Every event carries the caller's log id so one scheduling cycle can be
/// followed across the stores it touches.
#[derive(Debug, Clone, Default)]
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn log_reservation(&self, log_id: &str, node: &str, workload: &str, replaced: bool) {
        if replaced {
            info!(
                event = "reservation_replaced",
                log_id = %log_id,
                node = %node,
                workload = %workload,
                "Workload reservation already present, replaced"
            );
        } else {
            debug!(
                event = "reservation_added",
                log_id = %log_id,
                node = %node,
                workload = %workload,
                "Workload reservation added"
            );
        }
    }

    pub fn log_release(&self, log_id: &str, node: &str, workload: &str, existed: bool) {
        if existed {
            debug!(
                event = "reservation_released",
                log_id = %log_id,
                node = %node,
                workload = %workload,
                "Workload reservation released"
            );
        } else {
            info!(
                event = "reservation_missing",
                log_id = %log_id,
                node = %node,
                workload = %workload,
                "Release requested for unknown workload reservation"
            );
        }
    }

    /// Log an overlay result below zero; this points at double accounting
    pub fn log_negative_available(
        &self,
        log_id: &str,
        node: &str,
        zone: &str,
        resource: &str,
        available: &str,
    ) {
        warn!(
            event = "negative_available",
            log_id = %log_id,
            node = %node,
            zone = %zone,
            resource = %resource,
            available = %available,
            "Reservation overlay drove available resources below zero"
        );
    }

    pub fn log_fingerprint(
        &self,
        node: &str,
        published: &str,
        computed: &str,
        status: FingerprintStatus,
    ) {
        match status {
            FingerprintStatus::Stale => {
                info!(
                    event = "fingerprint_mismatch",
                    node = %node,
                    published = %published,
                    computed = %computed,
                    "Topology report does not match locally tracked workloads"
                );
            }
            FingerprintStatus::Consistent | FingerprintStatus::Unverified => {
                debug!(
                    event = "fingerprint_check",
                    node = %node,
                    published = %published,
                    computed = %computed,
                    result = %status,
                    "Fingerprint checked"
                );
            }
        }
    }

    pub fn log_flush(&self, log_id: &str, node: &str, dropped_reservations: usize) {
        info!(
            event = "node_flushed",
            log_id = %log_id,
            node = %node,
            dropped_reservations = dropped_reservations,
            "Cached topology replaced by verified report"
        );
    }

    pub fn log_stale_escalation(&self, log_id: &str, node: &str, attempts: u64) {
        warn!(
            event = "stale_escalation",
            log_id = %log_id,
            node = %node,
            attempts = attempts,
            "Node topology still stale after repeated flush attempts"
        );
    }
}
