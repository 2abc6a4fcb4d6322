//! Distributed split/transcode/merge coordination.
//!
//! This crate provides:
//! - The job [`Coordinator`]: split, batched dispatch, result collection, merge
//! - The part timeout tracker with an adaptive service-time estimate
//! - The [`WorkDispatchRouter`] seam and an in-process round-robin router
//! - Membership folding for status reporting
//! - Reaping of failed jobs' scratch directories

pub mod config;
pub mod coordinator;
pub mod error;
pub mod membership;
pub mod metrics;
pub mod reaper;
pub mod router;
pub mod tracker;

pub use config::{CoordinatorConfig, FailurePolicy, TrackerConfig};
pub use coordinator::{Coordinator, CoordinatorHandle, JobHandle};
pub use error::{CoordinatorError, CoordinatorResult, DispatchError};
pub use router::{RoundRobinRouter, WorkDispatchRouter};
pub use tracker::{PartTracker, TrackerHandle};
