//! Coordinator error types.

use thiserror::Error;

use vshard_worker::WorkerId;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A message is missing required fields or cannot be decoded.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A message refers to a unit or job that is not in the expected state.
    #[error("State inconsistency: {0}")]
    StateInconsistency(String),

    #[error("Coordinator is not running")]
    Unavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordinatorError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn protocol_violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    pub fn state_inconsistency(msg: impl Into<String>) -> Self {
        Self::StateInconsistency(msg.into())
    }
}

/// Errors routing a unit to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("No workers available")]
    NoWorkers,

    #[error("Worker {0} is gone")]
    WorkerGone(WorkerId),
}
