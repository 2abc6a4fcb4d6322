//! Coordinator/worker message protocol.
//!
//! These messages are transport-agnostic; any router that can carry serde
//! values can move them between nodes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{EncodeAttributes, UnitId};

/// One work unit sent to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WorkUnitDispatch {
    /// Unit identifier
    pub unit_id: UnitId,
    /// Raw split bytes
    pub payload: Vec<u8>,
    /// Attributes inherited from the job
    pub attributes: EncodeAttributes,
}

impl WorkUnitDispatch {
    pub fn new(unit_id: UnitId, payload: Vec<u8>, attributes: EncodeAttributes) -> Self {
        Self {
            unit_id,
            payload,
            attributes,
        }
    }
}

/// Encoded unit returned by a worker.
///
/// Fields are optional so that malformed input from the wire can be
/// represented and rejected by the coordinator instead of failing decode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct WorkUnitResult {
    #[serde(default)]
    pub unit_id: Option<UnitId>,
    #[serde(default)]
    pub payload: Option<Vec<u8>>,
    #[serde(default)]
    pub format: Option<String>,
}

impl WorkUnitResult {
    pub fn new(unit_id: UnitId, payload: Vec<u8>, format: impl Into<String>) -> Self {
        Self {
            unit_id: Some(unit_id),
            payload: Some(payload),
            format: Some(format.into()),
        }
    }

    /// Split into its parts, or `None` when any field is missing or empty.
    pub fn into_parts(self) -> Option<(UnitId, Vec<u8>, String)> {
        match (self.unit_id, self.payload, self.format) {
            (Some(unit_id), Some(payload), Some(format))
                if !unit_id.as_str().is_empty() && !format.is_empty() =>
            {
                Some((unit_id, payload, format))
            }
            _ => None,
        }
    }
}

/// Why a unit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Scratch read/write failed
    Io,
    /// External tool exited non-zero
    ExternalTool,
    /// Tracker deadline exceeded
    Timeout,
    /// Unit could not be handed to any worker
    Dispatch,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Io => "io",
            FailureKind::ExternalTool => "external_tool",
            FailureKind::Timeout => "timeout",
            FailureKind::Dispatch => "dispatch",
        }
    }
}

/// Unit failure, reported by a worker or synthesized by the tracker.
///
/// Carries the attributes so the unit can be re-dispatched without
/// reconstructing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WorkUnitFailure {
    /// Human readable reason; tool stderr verbatim for tool failures
    pub reason: String,
    pub unit_id: UnitId,
    pub attributes: EncodeAttributes,
    pub kind: FailureKind,
}

impl WorkUnitFailure {
    pub fn new(
        kind: FailureKind,
        reason: impl Into<String>,
        unit_id: UnitId,
        attributes: EncodeAttributes,
    ) -> Self {
        Self {
            reason: reason.into(),
            unit_id,
            attributes,
            kind,
        }
    }
}

/// Anything a worker (or the tracker) sends back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    Result(WorkUnitResult),
    Failure(WorkUnitFailure),
}
