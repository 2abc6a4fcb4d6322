//! Shared data models for vshard.
//!
//! This crate provides Serde-serializable types for:
//! - Job and work unit identifiers
//! - Encode attributes carried with every unit
//! - The coordinator/worker message protocol
//! - Job lifecycle states and submitter events
//! - Cluster status snapshots

pub mod attributes;
pub mod ids;
pub mod job;
pub mod messages;
pub mod status;

// Re-export common types
pub use attributes::EncodeAttributes;
pub use ids::{sequence_of, IdError, IdResult, JobId, UnitId, UNIT_ID_DELIMITER};
pub use job::{JobEvent, JobState, SubmitRequest};
pub use messages::{FailureKind, WorkUnitDispatch, WorkUnitFailure, WorkUnitResult, WorkerReply};
pub use status::{
    ClusterMember, ClusterSnapshot, CoordinatorStats, MemberEvent, MemberStatus, StatusResponse,
};
