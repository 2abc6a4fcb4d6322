//! Job submission, lifecycle states and submitter events.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{EncodeAttributes, JobId};

/// Job state in the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, split not started yet
    #[default]
    Submitted,
    /// Source is being cut into units
    Splitting,
    /// Units are being handed to workers
    Dispatching,
    /// Waiting for outstanding units
    Encoding,
    /// All units received, stitching the artifact
    Merging,
    /// Artifact delivered
    Completed,
    /// Job aborted
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Splitting => "splitting",
            JobState::Dispatching => "dispatching",
            JobState::Encoding => "encoding",
            JobState::Merging => "merging",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether unit results and failures are still meaningful.
    pub fn accepts_units(&self) -> bool {
        matches!(self, JobState::Dispatching | JobState::Encoding)
    }
}

/// Request to transcode one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubmitRequest {
    /// Absolute path of the source video
    pub source_path: PathBuf,
    /// Codec parameters applied to every unit
    pub attributes: EncodeAttributes,
    /// Name of the merged artifact; defaults to `result.{output_format}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_name: Option<String>,
}

impl SubmitRequest {
    pub fn new(source_path: impl Into<PathBuf>, attributes: EncodeAttributes) -> Self {
        Self {
            source_path: source_path.into(),
            attributes,
            output_file_name: None,
        }
    }

    /// Set the merged artifact name.
    pub fn with_output_file_name(mut self, name: impl Into<String>) -> Self {
        self.output_file_name = Some(name.into());
        self
    }

    /// Artifact name, falling back to `result.{output_format}`.
    pub fn resolved_output_file_name(&self) -> String {
        self.output_file_name
            .clone()
            .unwrap_or_else(|| format!("result.{}", self.attributes.output_format))
    }
}

/// Notification sent to the submitter of a job.
///
/// Every job produces zero or more `Progress` events followed by exactly
/// one terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        job_id: JobId,
        completed: usize,
        total: usize,
    },
    Complete {
        job_id: JobId,
        artifact_path: PathBuf,
    },
    Failed {
        job_id: JobId,
        reason: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Progress { job_id, .. }
            | JobEvent::Complete { job_id, .. }
            | JobEvent::Failed { job_id, .. } => job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }
}
