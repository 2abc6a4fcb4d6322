//! Worker error types.

use thiserror::Error;

use vshard_media::MediaError;
use vshard_models::{FailureKind, IdError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid unit: {0}")]
    InvalidUnit(#[from] IdError),

    #[error("Worker {0} is not accepting units")]
    Closed(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn closed(worker_id: impl Into<String>) -> Self {
        Self::Closed(worker_id.into())
    }

    /// Classification carried on the wire.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Media(e) if e.is_tool_failure() => FailureKind::ExternalTool,
            Self::Closed(_) => FailureKind::Dispatch,
            _ => FailureKind::Io,
        }
    }

    /// Text reported to the coordinator; tool stderr is passed through verbatim.
    pub fn failure_reason(&self) -> String {
        match self {
            Self::Media(e) => e.failure_reason(),
            other => other.to_string(),
        }
    }
}
