//! Metric names and recording helpers.
//!
//! Recording goes through the `metrics` facade. Without an installed recorder
//! every call is a no-op, so the pure reduction core can record freely.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Reductions performed, labelled by domain.
pub const REDUCTIONS_TOTAL: &str = "missionlog_reductions_total";
/// Events folded per reduction, labelled by domain.
pub const EVENTS_FOLDED: &str = "missionlog_events_folded";
/// Input events discarded as duplicates, labelled by domain.
pub const DUPLICATES_DROPPED_TOTAL: &str = "missionlog_duplicates_dropped_total";
/// Anomalies recorded, labelled by domain and kind.
pub const ANOMALIES_TOTAL: &str = "missionlog_anomalies_total";
/// Lamport clock mutations, labelled by operation.
pub const CLOCK_OPERATIONS_TOTAL: &str = "missionlog_clock_operations_total";
/// Conflict merges, labelled by whether manual review was required.
pub const MERGES_TOTAL: &str = "missionlog_merges_total";
/// Errors constructed, labelled by code and category.
pub const ERRORS_TOTAL: &str = "missionlog_errors_total";

/// Register descriptions for every metric this crate emits.
pub fn describe_metrics() {
    describe_counter!(REDUCTIONS_TOTAL, "Total number of reductions by domain");
    describe_histogram!(EVENTS_FOLDED, "Events folded per reduction");
    describe_counter!(
        DUPLICATES_DROPPED_TOTAL,
        "Input events collapsed by event_id deduplication"
    );
    describe_counter!(ANOMALIES_TOTAL, "Anomalies recorded during reduction");
    describe_counter!(CLOCK_OPERATIONS_TOTAL, "Lamport clock tick/update operations");
    describe_counter!(MERGES_TOTAL, "State machine merges performed");
    describe_counter!(ERRORS_TOTAL, "Errors by code and category");
}

/// Reduction metrics.
pub struct ReductionMetrics;

impl ReductionMetrics {
    /// Record one completed reduction.
    pub fn record(domain: &'static str, input_len: usize, canonical_len: usize, folded: usize) {
        counter!(REDUCTIONS_TOTAL, "domain" => domain).increment(1);
        histogram!(EVENTS_FOLDED, "domain" => domain).record(folded as f64);
        let duplicates = input_len.saturating_sub(canonical_len);
        if duplicates > 0 {
            counter!(DUPLICATES_DROPPED_TOTAL, "domain" => domain).increment(duplicates as u64);
        }
    }

    /// Record one anomaly.
    pub fn anomaly(domain: &'static str, kind: &'static str) {
        counter!(ANOMALIES_TOTAL, "domain" => domain, "kind" => kind).increment(1);
    }
}

/// Lamport clock metrics.
pub struct ClockMetrics;

impl ClockMetrics {
    pub fn tick() {
        counter!(CLOCK_OPERATIONS_TOTAL, "operation" => "tick").increment(1);
    }

    pub fn update() {
        counter!(CLOCK_OPERATIONS_TOTAL, "operation" => "update").increment(1);
    }
}

/// Merge metrics.
pub struct MergeMetrics;

impl MergeMetrics {
    pub fn record(requires_manual_review: bool) {
        counter!(
            MERGES_TOTAL,
            "manual_review" => if requires_manual_review { "true" } else { "false" },
        )
        .increment(1);
    }
}
