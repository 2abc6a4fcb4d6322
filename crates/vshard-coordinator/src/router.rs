//! Dispatch routing.
//!
//! The coordinator never talks to workers directly; it hands each unit to a
//! [`WorkDispatchRouter`], which picks a worker and forwards the unit along
//! with the sink the worker must reply to.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use vshard_models::{WorkUnitDispatch, WorkerReply};
use vshard_worker::{WorkerHandle, WorkerId};

use crate::error::DispatchError;

/// Load-balances units across available workers.
#[async_trait]
pub trait WorkDispatchRouter: Send + Sync {
    /// Deliver `unit` to some worker and return the worker's id.
    async fn dispatch(
        &self,
        unit: WorkUnitDispatch,
        reply_to: mpsc::UnboundedSender<WorkerReply>,
    ) -> Result<WorkerId, DispatchError>;
}

/// Round-robin over in-process workers, skipping stopped ones.
#[derive(Debug)]
pub struct RoundRobinRouter {
    workers: Vec<WorkerHandle>,
    next: AtomicUsize,
}

impl RoundRobinRouter {
    pub fn new(workers: Vec<WorkerHandle>) -> Self {
        Self {
            workers,
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Workers still accepting units.
    pub fn live_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_closed()).count()
    }
}

#[async_trait]
impl WorkDispatchRouter for RoundRobinRouter {
    async fn dispatch(
        &self,
        unit: WorkUnitDispatch,
        reply_to: mpsc::UnboundedSender<WorkerReply>,
    ) -> Result<WorkerId, DispatchError> {
        let count = self.workers.len();
        for _ in 0..count {
            let index = self.next.fetch_add(1, Ordering::Relaxed) % count;
            let worker = &self.workers[index];
            if worker.is_closed() {
                continue;
            }

            let unit_id = unit.unit_id.clone();
            return match worker.process(unit, reply_to) {
                Ok(()) => {
                    debug!(unit_id = %unit_id, worker_id = %worker.id(), "Dispatched unit");
                    Ok(worker.id().to_string())
                }
                Err(e) => {
                    warn!(unit_id = %unit_id, worker_id = %worker.id(), "Dispatch failed: {}", e);
                    Err(DispatchError::WorkerGone(worker.id().to_string()))
                }
            };
        }

        Err(DispatchError::NoWorkers)
    }
}
