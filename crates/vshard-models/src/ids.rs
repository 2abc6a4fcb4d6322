//! Job and work unit identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Separator between the job id and the split file name inside a unit id.
///
/// Never produced by UUIDs or by the numeric split file names.
pub const UNIT_ID_DELIMITER: &str = "--@@@--";

pub type IdResult<T> = Result<T, IdError>;

/// Errors decoding a unit identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("Unit id has no job delimiter: {0}")]
    MissingDelimiter(String),

    #[error("Unit file name has no numeric sequence: {0}")]
    MissingSequence(String),
}

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one work unit: `{jobId}--@@@--{sequenceFileName}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    /// Build the id of a split file belonging to `job_id`.
    pub fn new(job_id: &JobId, file_name: &str) -> Self {
        Self(format!("{}{}{}", job_id.as_str(), UNIT_ID_DELIMITER, file_name))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the owning job id (substring before the first delimiter).
    pub fn job_id(&self) -> IdResult<JobId> {
        self.0
            .find(UNIT_ID_DELIMITER)
            .map(|idx| JobId::from_string(&self.0[..idx]))
            .ok_or_else(|| IdError::MissingDelimiter(self.0.clone()))
    }

    /// The split file name this unit was created from.
    pub fn file_name(&self) -> IdResult<&str> {
        self.0
            .find(UNIT_ID_DELIMITER)
            .map(|idx| &self.0[idx + UNIT_ID_DELIMITER.len()..])
            .ok_or_else(|| IdError::MissingDelimiter(self.0.clone()))
    }

    /// Numeric sequence embedded in the file name.
    pub fn sequence(&self) -> IdResult<u64> {
        let name = self.file_name()?;
        sequence_of(name).ok_or_else(|| IdError::MissingSequence(name.to_string()))
    }

    /// File name for the encoded result of this unit, e.g. `7.mkv`.
    pub fn result_file_name(&self, format: &str) -> IdResult<String> {
        Ok(format!("{}.{}", self.sequence()?, format))
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse the numeric sequence from a unit file name (`"10.mp4"` -> 10).
///
/// The sequence is everything before the first `.`; names without a
/// purely numeric stem yield `None`.
pub fn sequence_of(file_name: &str) -> Option<u64> {
    let stem = file_name.split('.').next()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
