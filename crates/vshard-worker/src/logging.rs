//! Structured unit logging.
//!
//! Every log line of a unit carries the unit id and the worker handling it.

use tracing::{error, info, warn, Span};
use vshard_models::UnitId;

/// Unit logger with consistent lifecycle messages.
#[derive(Debug, Clone)]
pub struct UnitLogger {
    unit_id: String,
    worker_id: String,
}

impl UnitLogger {
    /// Create a logger for `unit_id` handled by `worker_id`.
    pub fn new(unit_id: &UnitId, worker_id: &str) -> Self {
        Self {
            unit_id: unit_id.to_string(),
            worker_id: worker_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            unit_id = %self.unit_id,
            worker_id = %self.worker_id,
            "Unit started: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            unit_id = %self.unit_id,
            worker_id = %self.worker_id,
            "Unit warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            unit_id = %self.unit_id,
            worker_id = %self.worker_id,
            "Unit error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            unit_id = %self.unit_id,
            worker_id = %self.worker_id,
            "Unit completed: {}", message
        );
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Span wrapping all work done for the unit.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "unit",
            unit_id = %self.unit_id,
            worker_id = %self.worker_id
        )
    }
}
