//! Cluster membership notifications.
//!
//! Membership only feeds status reporting: events are folded into the
//! coordinator's cached [`ClusterSnapshot`](vshard_models::ClusterSnapshot)
//! and logged. Routing decisions are left to the router.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vshard_models::MemberEvent;
use vshard_worker::WorkerHandle;

use crate::coordinator::CoordinatorHandle;

/// Log a membership change.
pub fn log_member_event(event: &MemberEvent) {
    match event {
        MemberEvent::Up { node } => info!(node = %node, "Member is up"),
        MemberEvent::Unreachable { node } => warn!(node = %node, "Member detected as unreachable"),
        MemberEvent::Removed { node } => info!(node = %node, "Member is removed"),
        MemberEvent::LoadChanged { node, load } => debug!(node = %node, load, "Member load changed"),
    }
}

/// Forward events from an external membership source to the coordinator.
///
/// Stops when the source closes or the coordinator is gone.
pub fn spawn_membership_listener(
    mut events: mpsc::UnboundedReceiver<MemberEvent>,
    coordinator: CoordinatorHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if coordinator.membership_event(event).is_err() {
                debug!("Coordinator stopped, ending membership listener");
                break;
            }
        }
    })
}

/// `Up` events announcing an in-process worker pool.
pub fn local_pool_events(workers: &[WorkerHandle]) -> Vec<MemberEvent> {
    workers
        .iter()
        .map(|w| MemberEvent::Up {
            node: w.id().to_string(),
        })
        .collect()
}
