//! Worker metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Transcode wall time per unit in seconds.
    pub const TRANSCODE_DURATION_SECONDS: &str = "vshard_transcode_duration_seconds";

    /// Units handled by workers, by outcome.
    pub const WORKER_UNITS_TOTAL: &str = "vshard_worker_units_total";
}

/// Record one finished transcode.
pub fn record_transcode(duration_secs: f64) {
    histogram!(names::TRANSCODE_DURATION_SECONDS).record(duration_secs);
}

/// Record the outcome of one unit ("ok" or a failure kind).
pub fn record_unit_outcome(outcome: &str) {
    counter!(names::WORKER_UNITS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}
