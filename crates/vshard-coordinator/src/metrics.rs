//! Coordinator metrics.

use metrics::{counter, gauge};

/// Metric name constants for consistency.
pub mod names {
    // Unit metrics
    pub const UNITS_DISPATCHED_TOTAL: &str = "vshard_units_dispatched_total";
    pub const UNIT_RESULTS_TOTAL: &str = "vshard_unit_results_total";
    pub const UNIT_FAILURES_TOTAL: &str = "vshard_unit_failures_total";
    pub const OUTSTANDING_UNITS: &str = "vshard_outstanding_units";

    // Job metrics
    pub const JOBS_COMPLETED_TOTAL: &str = "vshard_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vshard_jobs_failed_total";

    // Tracker metrics
    pub const SERVICE_TIME_TICKS: &str = "vshard_service_time_ticks";
}

pub fn record_unit_dispatched() {
    counter!(names::UNITS_DISPATCHED_TOTAL).increment(1);
}

pub fn record_unit_result() {
    counter!(names::UNIT_RESULTS_TOTAL).increment(1);
}

/// Record a unit failure by kind.
pub fn record_unit_failure(kind: &str) {
    counter!(names::UNIT_FAILURES_TOTAL, "kind" => kind.to_string()).increment(1);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_job_failed() {
    counter!(names::JOBS_FAILED_TOTAL).increment(1);
}

/// Update the outstanding units gauge.
pub fn set_outstanding_units(count: usize) {
    gauge!(names::OUTSTANDING_UNITS).set(count as f64);
}

/// Update the published service-time estimate.
pub fn set_service_time(ticks: f64) {
    gauge!(names::SERVICE_TIME_TICKS).set(ticks);
}
