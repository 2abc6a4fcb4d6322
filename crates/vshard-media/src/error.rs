//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while splitting, transcoding or merging.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(PathBuf),

    #[error("FFmpeg exited with status {exit_code:?}")]
    ToolFailed {
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("Split process failed: {stderr}")]
    SplitFailed { stderr: String },

    #[error("Transcode process failed: {stderr}")]
    TranscodeFailed {
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("Merge process failed: {stderr}")]
    MergeFailed { stderr: String },

    #[error("No files to merge in directory: {0}")]
    NoUnitFiles(PathBuf),

    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create a tool failure error.
    pub fn tool_failed(stderr: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::ToolFailed {
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Re-tag a generic tool failure as a split failure.
    pub fn into_split_failure(self) -> Self {
        match self {
            Self::ToolFailed { stderr, .. } => Self::SplitFailed { stderr },
            other => other,
        }
    }

    /// Re-tag a generic tool failure as a transcode failure.
    pub fn into_transcode_failure(self) -> Self {
        match self {
            Self::ToolFailed { stderr, exit_code } => Self::TranscodeFailed { stderr, exit_code },
            other => other,
        }
    }

    /// Re-tag a generic tool failure as a merge failure.
    pub fn into_merge_failure(self) -> Self {
        match self {
            Self::ToolFailed { stderr, .. } => Self::MergeFailed { stderr },
            other => other,
        }
    }

    /// Whether the external tool itself reported the failure.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::ToolFailed { .. }
                | Self::SplitFailed { .. }
                | Self::TranscodeFailed { .. }
                | Self::MergeFailed { .. }
                | Self::Timeout(_)
        )
    }

    /// Text to report upstream: tool stderr verbatim when there is any.
    pub fn failure_reason(&self) -> String {
        match self {
            Self::ToolFailed { stderr, .. }
            | Self::SplitFailed { stderr }
            | Self::TranscodeFailed { stderr, .. }
            | Self::MergeFailed { stderr }
                if !stderr.is_empty() =>
            {
                stderr.clone()
            }
            other => other.to_string(),
        }
    }
}
