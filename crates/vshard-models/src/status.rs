//! Cluster status snapshot returned by status queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reachability of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Up,
    Unreachable,
    Removed,
}

/// Membership change surfaced by the cluster layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemberEvent {
    Up { node: String },
    Unreachable { node: String },
    Removed { node: String },
    LoadChanged { node: String, load: f64 },
}

impl MemberEvent {
    pub fn node(&self) -> &str {
        match self {
            MemberEvent::Up { node }
            | MemberEvent::Unreachable { node }
            | MemberEvent::Removed { node }
            | MemberEvent::LoadChanged { node, .. } => node,
        }
    }
}

/// Last known state of one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterMember {
    pub node: String,
    pub status: MemberStatus,
    /// Last reported load, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Cached view of the cluster, folded from [`MemberEvent`]s.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClusterSnapshot {
    pub members: BTreeMap<String, ClusterMember>,
}

impl ClusterSnapshot {
    /// Fold one membership event into the snapshot.
    pub fn apply(&mut self, event: &MemberEvent) {
        let now = Utc::now();
        let node = event.node().to_string();

        match event {
            MemberEvent::LoadChanged { load, .. } => {
                let member = self
                    .members
                    .entry(node.clone())
                    .or_insert_with(|| ClusterMember {
                        node,
                        status: MemberStatus::Up,
                        load: None,
                        updated_at: now,
                    });
                member.load = Some(*load);
                member.updated_at = now;
            }
            MemberEvent::Up { .. } | MemberEvent::Unreachable { .. } | MemberEvent::Removed { .. } => {
                let status = match event {
                    MemberEvent::Up { .. } => MemberStatus::Up,
                    MemberEvent::Unreachable { .. } => MemberStatus::Unreachable,
                    _ => MemberStatus::Removed,
                };
                let member = self
                    .members
                    .entry(node.clone())
                    .or_insert_with(|| ClusterMember {
                        node,
                        status,
                        load: None,
                        updated_at: now,
                    });
                member.status = status;
                member.updated_at = now;
            }
        }
    }

    /// Number of members currently up.
    pub fn up_count(&self) -> usize {
        self.members
            .values()
            .filter(|m| m.status == MemberStatus::Up)
            .count()
    }
}

/// Coordinator counters included in status responses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct CoordinatorStats {
    /// Jobs not yet terminal
    pub active_jobs: usize,
    /// Units dispatched but not yet received, across all jobs
    pub outstanding_units: usize,
    /// Units the timeout tracker is still counting ticks for
    pub tracked_units: usize,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    /// Current per-unit service-time estimate, in tracker ticks
    pub service_time_estimate: f64,
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct StatusResponse {
    pub cluster: ClusterSnapshot,
    pub metrics: CoordinatorStats,
}
