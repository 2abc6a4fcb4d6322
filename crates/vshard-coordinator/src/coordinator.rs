//! Job coordinator.
//!
//! Owns every job from submission to its single terminal event:
//!
//! ```text
//! submit -> split -> dispatch (batches) -> collect results -> merge
//!                                      \-> unit failure / timeout -> fail job
//! ```
//!
//! The coordinator is one task draining its inbox and the worker reply
//! channel. Split, merge, payload reads and result writes run on spawned
//! tasks that report back through the inbox, so the loop never waits on I/O.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::fs;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use vshard_media::{MediaError, MediaResult, ScratchLayout, SplitMergeExecutor};
use vshard_models::{
    ClusterSnapshot, CoordinatorStats, EncodeAttributes, JobEvent, JobId, JobState, MemberEvent,
    StatusResponse, SubmitRequest, UnitId, WorkUnitDispatch, WorkUnitFailure, WorkUnitResult,
    WorkerReply,
};

use crate::config::{CoordinatorConfig, FailurePolicy};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::membership::log_member_event;
use crate::metrics;
use crate::reaper::spawn_reap;
use crate::router::WorkDispatchRouter;
use crate::tracker::TrackerHandle;

/// Returned on submission: the job id and the job's event stream.
///
/// The stream yields `Progress` events followed by exactly one `Complete`
/// or `Failed`.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: JobId,
    pub events: mpsc::UnboundedReceiver<JobEvent>,
}

impl JobHandle {
    /// Wait for the terminal event, skipping progress.
    pub async fn wait(&mut self) -> Option<JobEvent> {
        while let Some(event) = self.events.recv().await {
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }
}

/// Coordinator inbox.
#[derive(Debug)]
enum CoordinatorMessage {
    Submit {
        request: SubmitRequest,
        reply: oneshot::Sender<CoordinatorResult<JobHandle>>,
    },
    Status {
        reply: oneshot::Sender<StatusResponse>,
    },
    Membership(MemberEvent),
    SplitFinished {
        job_id: JobId,
        result: MediaResult<Vec<PathBuf>>,
    },
    UnitPersisted {
        job_id: JobId,
        unit_id: UnitId,
        result: std::io::Result<()>,
    },
    MergeFinished {
        job_id: JobId,
        result: MediaResult<PathBuf>,
    },
}

/// Cloneable address of a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorMessage>,
}

impl CoordinatorHandle {
    /// Submit a job. Replies as soon as the job is recorded; splitting
    /// continues in the background.
    pub async fn submit(&self, request: SubmitRequest) -> CoordinatorResult<JobHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMessage::Submit { request, reply })
            .map_err(|_| CoordinatorError::Unavailable)?;
        rx.await.map_err(|_| CoordinatorError::Unavailable)?
    }

    /// Cached cluster view and coordinator counters.
    pub async fn status(&self) -> CoordinatorResult<StatusResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMessage::Status { reply })
            .map_err(|_| CoordinatorError::Unavailable)?;
        rx.await.map_err(|_| CoordinatorError::Unavailable)
    }

    /// Feed a membership change into the status snapshot.
    pub fn membership_event(&self, event: MemberEvent) -> CoordinatorResult<()> {
        self.tx
            .send(CoordinatorMessage::Membership(event))
            .map_err(|_| CoordinatorError::Unavailable)
    }
}

/// Coordinator-side record of one job.
#[derive(Debug)]
struct JobRecord {
    request: SubmitRequest,
    state: JobState,
    events: mpsc::UnboundedSender<JobEvent>,
    outstanding: HashSet<UnitId>,
    total_units: usize,
    completed_units: usize,
    pending_writes: usize,
    attempts: HashMap<UnitId, u32>,
    /// Set once the job fails; dispatch tasks stop registering and sending
    abort: watch::Sender<bool>,
    dispatch_tasks: Vec<AbortHandle>,
}

impl JobRecord {
    fn new(request: SubmitRequest, events: mpsc::UnboundedSender<JobEvent>) -> Self {
        let (abort, _) = watch::channel(false);
        Self {
            request,
            state: JobState::Submitted,
            events,
            outstanding: HashSet::new(),
            total_units: 0,
            completed_units: 0,
            pending_writes: 0,
            attempts: HashMap::new(),
            abort,
            dispatch_tasks: Vec::new(),
        }
    }

    fn transition(&mut self, job_id: &JobId, next: JobState) {
        debug!(
            job_id = %job_id,
            from = self.state.as_str(),
            to = next.as_str(),
            "Job state changed"
        );
        self.state = next;
    }

    fn notify(&self, job_id: &JobId, event: JobEvent) {
        if self.events.send(event).is_err() {
            debug!(job_id = %job_id, "Submitter dropped its event stream");
        }
    }

    /// Move to the terminal state matching `event` and deliver it.
    fn retire(&mut self, job_id: &JobId, event: JobEvent) {
        let terminal = match event {
            JobEvent::Complete { .. } => Some(JobState::Completed),
            JobEvent::Failed { .. } => Some(JobState::Failed),
            JobEvent::Progress { .. } => None,
        };
        if let Some(terminal) = terminal {
            self.transition(job_id, terminal);
        }
        self.notify(job_id, event);
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    layout: ScratchLayout,
    executor: Arc<dyn SplitMergeExecutor>,
    router: Arc<dyn WorkDispatchRouter>,
    tracker: TrackerHandle,
    rx: mpsc::UnboundedReceiver<CoordinatorMessage>,
    inbox: mpsc::WeakUnboundedSender<CoordinatorMessage>,
    replies_rx: mpsc::UnboundedReceiver<WorkerReply>,
    replies_tx: mpsc::UnboundedSender<WorkerReply>,
    jobs: HashMap<JobId, JobRecord>,
    /// Failed jobs waiting for in-flight result writes before reaping
    reaping: HashMap<JobId, usize>,
    cluster: ClusterSnapshot,
    jobs_completed: u64,
    jobs_failed: u64,
}

impl Coordinator {
    /// Start the coordinator and its tracker.
    pub fn spawn(
        config: CoordinatorConfig,
        executor: Arc<dyn SplitMergeExecutor>,
        router: Arc<dyn WorkDispatchRouter>,
    ) -> CoordinatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        let tracker = TrackerHandle::spawn(config.tracker.clone(), replies_tx.clone());

        info!(
            scratch_root = %config.scratch_root.display(),
            segment_secs = config.segment_secs,
            dispatch_batch_size = config.dispatch_batch_size,
            failure_policy = ?config.failure_policy,
            "Starting coordinator"
        );

        let coordinator = Self {
            layout: ScratchLayout::new(&config.scratch_root),
            config,
            executor,
            router,
            tracker,
            rx,
            inbox: tx.downgrade(),
            replies_rx,
            replies_tx,
            jobs: HashMap::new(),
            reaping: HashMap::new(),
            cluster: ClusterSnapshot::default(),
            jobs_completed: 0,
            jobs_failed: 0,
        };
        tokio::spawn(coordinator.run());

        CoordinatorHandle { tx }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle_message(msg),
                    None => break,
                },
                Some(reply) = self.replies_rx.recv() => self.handle_reply(reply),
            }
        }
        info!(active_jobs = self.jobs.len(), "Coordinator stopped");
    }

    fn handle_message(&mut self, msg: CoordinatorMessage) {
        match msg {
            CoordinatorMessage::Submit { request, reply } => {
                let _ = reply.send(self.submit(request));
            }
            CoordinatorMessage::Status { reply } => {
                let _ = reply.send(self.status());
            }
            CoordinatorMessage::Membership(event) => {
                log_member_event(&event);
                self.cluster.apply(&event);
            }
            CoordinatorMessage::SplitFinished { job_id, result } => {
                self.on_split_finished(job_id, result);
            }
            CoordinatorMessage::UnitPersisted {
                job_id,
                unit_id,
                result,
            } => self.on_unit_persisted(job_id, unit_id, result),
            CoordinatorMessage::MergeFinished { job_id, result } => {
                self.on_merge_finished(job_id, result);
            }
        }
    }

    fn handle_reply(&mut self, reply: WorkerReply) {
        match reply {
            WorkerReply::Result(result) => {
                if let Err(e) = self.on_unit_result(result) {
                    warn!("Dropping unit result: {}", e);
                }
            }
            WorkerReply::Failure(failure) => {
                if let Err(e) = self.on_unit_failure(failure) {
                    warn!("Dropping unit failure: {}", e);
                }
            }
        }
    }

    // =========================================================================
    // Submission and split
    // =========================================================================

    fn submit(&mut self, request: SubmitRequest) -> CoordinatorResult<JobHandle> {
        if request.source_path.as_os_str().is_empty() {
            return Err(CoordinatorError::invalid_request("source path is empty"));
        }
        if request.attributes.output_format.trim().is_empty() {
            return Err(CoordinatorError::invalid_request("output format is empty"));
        }

        let job_id = JobId::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let segment_secs = request
            .attributes
            .segment_secs
            .unwrap_or(self.config.segment_secs);

        info!(
            job_id = %job_id,
            source = %request.source_path.display(),
            output_format = %request.attributes.output_format,
            segment_secs,
            "Job submitted"
        );

        let inbox = self.inbox.upgrade().ok_or(CoordinatorError::Unavailable)?;
        let mut job = JobRecord::new(request, events_tx);
        let executor = Arc::clone(&self.executor);
        let source = job.request.source_path.clone();
        let attributes = job.request.attributes.clone();
        let split_job_id = job_id.clone();
        tokio::spawn(async move {
            let result = executor
                .split(&source, &attributes, &split_job_id, segment_secs)
                .await;
            let _ = inbox.send(CoordinatorMessage::SplitFinished {
                job_id: split_job_id,
                result,
            });
        });

        job.transition(&job_id, JobState::Splitting);
        self.jobs.insert(job_id.clone(), job);

        Ok(JobHandle {
            job_id,
            events: events_rx,
        })
    }

    fn on_split_finished(&mut self, job_id: JobId, result: MediaResult<Vec<PathBuf>>) {
        let units = match result {
            Ok(files) => files
                .into_iter()
                .filter_map(|path| {
                    let name = path.file_name()?.to_str()?.to_string();
                    Some((UnitId::new(&job_id, &name), path))
                })
                .collect::<Vec<_>>(),
            Err(e) => {
                self.fail_job(&job_id, e.failure_reason());
                return;
            }
        };

        if units.is_empty() {
            self.fail_job(&job_id, "Split produced no units");
            return;
        }

        let Some(job) = self.jobs.get_mut(&job_id) else {
            debug!(job_id = %job_id, "Split finished for unknown job");
            return;
        };

        job.transition(&job_id, JobState::Dispatching);
        job.total_units = units.len();
        job.outstanding = units.iter().map(|(unit_id, _)| unit_id.clone()).collect();
        let attributes = job.request.attributes.clone();
        let abort = job.abort.subscribe();

        info!(job_id = %job_id, units = units.len(), "Dispatching units");
        let dispatch_tasks = self.dispatch_units(&job_id, units, attributes, abort);

        if let Some(job) = self.jobs.get_mut(&job_id) {
            job.transition(&job_id, JobState::Encoding);
            job.dispatch_tasks = dispatch_tasks;
        }
        self.publish_outstanding();
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Send units in fixed-size concurrent batches.
    ///
    /// Returns abort handles for the batches so a failed job can stop them.
    fn dispatch_units(
        &self,
        job_id: &JobId,
        units: Vec<(UnitId, PathBuf)>,
        attributes: EncodeAttributes,
        abort: watch::Receiver<bool>,
    ) -> Vec<AbortHandle> {
        let batch_size = self.config.dispatch_batch_size.max(1);
        let batches: Vec<JoinHandle<()>> = units
            .chunks(batch_size)
            .map(|batch| {
                tokio::spawn(dispatch_batch(
                    job_id.clone(),
                    batch.to_vec(),
                    attributes.clone(),
                    Arc::clone(&self.router),
                    self.tracker.clone(),
                    self.replies_tx.clone(),
                    abort.clone(),
                ))
            })
            .collect();
        let abort_handles = batches.iter().map(JoinHandle::abort_handle).collect();

        let job_id = job_id.clone();
        tokio::spawn(async move {
            for joined in join_all(batches).await {
                match joined {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => {
                        debug!(job_id = %job_id, "Dispatch batch cancelled");
                    }
                    Err(e) => error!(job_id = %job_id, "Dispatch batch panicked: {}", e),
                }
            }
            debug!(job_id = %job_id, "All dispatch batches finished");
        });

        abort_handles
    }

    fn redispatch(
        &self,
        unit_id: UnitId,
        attributes: EncodeAttributes,
        abort: watch::Receiver<bool>,
    ) {
        let source = match self.layout.unit_source_file(&unit_id) {
            Ok(path) => path,
            Err(e) => {
                warn!(unit_id = %unit_id, "Cannot redispatch: {}", e);
                return;
            }
        };

        self.tracker.reset(unit_id.clone());
        tokio::spawn(send_unit(
            unit_id,
            source,
            attributes,
            Arc::clone(&self.router),
            self.replies_tx.clone(),
            abort,
        ));
    }

    // =========================================================================
    // Results
    // =========================================================================

    fn on_unit_result(&mut self, result: WorkUnitResult) -> CoordinatorResult<()> {
        let (unit_id, payload, format) = result.into_parts().ok_or_else(|| {
            CoordinatorError::protocol_violation("result is missing unit id, payload or format")
        })?;
        let job_id = unit_id
            .job_id()
            .map_err(|e| CoordinatorError::protocol_violation(e.to_string()))?;
        let target = self
            .layout
            .received_unit_file(&unit_id, &format)
            .map_err(|e| CoordinatorError::protocol_violation(e.to_string()))?;

        let job = self
            .jobs
            .get_mut(&job_id)
            .filter(|job| job.state.accepts_units())
            .ok_or_else(|| {
                CoordinatorError::state_inconsistency(format!("no live job for unit {}", unit_id))
            })?;
        if !job.outstanding.remove(&unit_id) {
            return Err(CoordinatorError::state_inconsistency(format!(
                "unit {} is not outstanding",
                unit_id
            )));
        }

        self.tracker.untrack(unit_id.clone());
        metrics::record_unit_result();

        job.completed_units += 1;
        job.pending_writes += 1;
        job.notify(
            &job_id,
            JobEvent::Progress {
                job_id: job_id.clone(),
                completed: job.completed_units,
                total: job.total_units,
            },
        );
        debug!(
            job_id = %job_id,
            unit_id = %unit_id,
            completed = job.completed_units,
            total = job.total_units,
            "Unit result received"
        );

        let inbox = self.inbox.upgrade().ok_or(CoordinatorError::Unavailable)?;
        tokio::spawn(async move {
            let result = fs::write(&target, payload).await;
            let _ = inbox.send(CoordinatorMessage::UnitPersisted {
                job_id,
                unit_id,
                result,
            });
        });

        self.publish_outstanding();
        Ok(())
    }

    fn on_unit_persisted(&mut self, job_id: JobId, unit_id: UnitId, result: std::io::Result<()>) {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            self.on_late_write(job_id, unit_id);
            return;
        };
        job.pending_writes = job.pending_writes.saturating_sub(1);

        if let Err(e) = result {
            self.fail_job(
                &job_id,
                format!("Failed to persist unit {}: {}", unit_id, e),
            );
            return;
        }

        if job.state == JobState::Encoding && job.outstanding.is_empty() && job.pending_writes == 0
        {
            self.start_merge(job_id);
        }
    }

    /// A write finished after its job failed.
    fn on_late_write(&mut self, job_id: JobId, unit_id: UnitId) {
        let Some(pending) = self.reaping.get_mut(&job_id) else {
            debug!(job_id = %job_id, unit_id = %unit_id, "Write finished for finished job");
            return;
        };
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.reaping.remove(&job_id);
            spawn_reap(self.layout.clone(), job_id);
        }
    }

    // =========================================================================
    // Failures
    // =========================================================================

    fn on_unit_failure(&mut self, failure: WorkUnitFailure) -> CoordinatorResult<()> {
        let job_id = failure
            .unit_id
            .job_id()
            .map_err(|e| CoordinatorError::protocol_violation(e.to_string()))?;

        let policy = self.config.failure_policy;
        let job = self
            .jobs
            .get_mut(&job_id)
            .filter(|job| job.state.accepts_units() && job.outstanding.contains(&failure.unit_id))
            .ok_or_else(|| {
                CoordinatorError::state_inconsistency(format!(
                    "failure for unit {} that is not outstanding",
                    failure.unit_id
                ))
            })?;

        metrics::record_unit_failure(failure.kind.as_str());
        warn!(
            job_id = %job_id,
            unit_id = %failure.unit_id,
            kind = failure.kind.as_str(),
            "Unit failed: {}",
            failure.reason.trim_end()
        );

        match policy {
            FailurePolicy::FailFast => self.fail_job(&job_id, failure.reason),
            FailurePolicy::Redispatch { max_attempts } => {
                let attempts = job.attempts.entry(failure.unit_id.clone()).or_insert(1);
                if *attempts >= max_attempts {
                    let reason = format!(
                        "Unit {} failed after {} attempts: {}",
                        failure.unit_id, attempts, failure.reason
                    );
                    self.fail_job(&job_id, reason);
                } else {
                    *attempts += 1;
                    info!(
                        job_id = %job_id,
                        unit_id = %failure.unit_id,
                        attempt = *attempts,
                        "Redispatching unit"
                    );
                    let abort = job.abort.subscribe();
                    self.redispatch(failure.unit_id, failure.attributes, abort);
                }
            }
        }
        Ok(())
    }

    /// Abort a job: forget its units, notify the submitter, reap its scratch.
    fn fail_job(&mut self, job_id: &JobId, reason: impl Into<String>) {
        let Some(mut job) = self.jobs.remove(job_id) else {
            debug!(job_id = %job_id, "Failure for job that already finished");
            return;
        };
        let reason = reason.into();

        // The flag must be set before the tracker drops the job: a batch that
        // registers afterwards sees it and drops the job again.
        job.abort.send_replace(true);
        for task in job.dispatch_tasks.drain(..) {
            task.abort();
        }
        self.tracker.drop_job(job_id.clone());
        self.jobs_failed += 1;
        metrics::record_job_failed();
        error!(
            job_id = %job_id,
            state = job.state.as_str(),
            completed = job.completed_units,
            total = job.total_units,
            "Job failed: {}",
            reason.trim_end()
        );

        job.retire(
            job_id,
            JobEvent::Failed {
                job_id: job_id.clone(),
                reason,
            },
        );

        if self.config.cleanup_failed_jobs {
            if job.pending_writes == 0 {
                spawn_reap(self.layout.clone(), job_id.clone());
            } else {
                self.reaping.insert(job_id.clone(), job.pending_writes);
            }
        }
        self.publish_outstanding();
    }

    // =========================================================================
    // Merge
    // =========================================================================

    fn start_merge(&mut self, job_id: JobId) {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return;
        };
        let Some(inbox) = self.inbox.upgrade() else {
            return;
        };
        job.transition(&job_id, JobState::Merging);
        let output_file_name = job.request.resolved_output_file_name();

        info!(job_id = %job_id, units = job.total_units, "All units received, merging");

        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let result = executor.merge(&job_id, &output_file_name).await;
            let _ = inbox.send(CoordinatorMessage::MergeFinished { job_id, result });
        });
    }

    fn on_merge_finished(&mut self, job_id: JobId, result: MediaResult<PathBuf>) {
        match result {
            Ok(artifact_path) => {
                let Some(mut job) = self.jobs.remove(&job_id) else {
                    return;
                };
                self.jobs_completed += 1;
                metrics::record_job_completed();
                info!(
                    job_id = %job_id,
                    artifact = %artifact_path.display(),
                    units = job.total_units,
                    "Job completed"
                );
                job.retire(
                    &job_id,
                    JobEvent::Complete {
                        job_id: job_id.clone(),
                        artifact_path,
                    },
                );
            }
            Err(e) => self.fail_job(&job_id, merge_failure_reason(&e)),
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    fn outstanding_units(&self) -> usize {
        self.jobs.values().map(|job| job.outstanding.len()).sum()
    }

    fn publish_outstanding(&self) {
        metrics::set_outstanding_units(self.outstanding_units());
    }

    fn status(&self) -> StatusResponse {
        StatusResponse {
            cluster: self.cluster.clone(),
            metrics: CoordinatorStats {
                active_jobs: self.jobs.len(),
                outstanding_units: self.outstanding_units(),
                tracked_units: self.tracker.tracked(),
                jobs_completed: self.jobs_completed,
                jobs_failed: self.jobs_failed,
                service_time_estimate: self.tracker.average(),
            },
        }
    }
}

fn merge_failure_reason(e: &MediaError) -> String {
    match e {
        MediaError::NoUnitFiles(_) => format!("Illegal state: {}", e),
        other => other.failure_reason(),
    }
}

/// Register each unit with the tracker, then read and send it.
///
/// Registration comes first so a unit that never reaches a worker still
/// times out. Stops as soon as the job is aborted.
async fn dispatch_batch(
    job_id: JobId,
    units: Vec<(UnitId, PathBuf)>,
    attributes: EncodeAttributes,
    router: Arc<dyn WorkDispatchRouter>,
    tracker: TrackerHandle,
    replies: mpsc::UnboundedSender<WorkerReply>,
    abort: watch::Receiver<bool>,
) {
    for (unit_id, path) in units {
        if *abort.borrow() {
            break;
        }
        tracker.register(unit_id.clone(), attributes.clone());
        // Aborted between the check and the registration
        if *abort.borrow() {
            tracker.drop_job(job_id.clone());
            break;
        }
        send_unit(
            unit_id,
            path,
            attributes.clone(),
            Arc::clone(&router),
            replies.clone(),
            abort.clone(),
        )
        .await;
    }
}

async fn send_unit(
    unit_id: UnitId,
    path: PathBuf,
    attributes: EncodeAttributes,
    router: Arc<dyn WorkDispatchRouter>,
    replies: mpsc::UnboundedSender<WorkerReply>,
    abort: watch::Receiver<bool>,
) {
    let payload = match fs::read(&path).await {
        Ok(payload) => payload,
        Err(e) => {
            warn!(unit_id = %unit_id, "Failed to read unit {}: {}", path.display(), e);
            return;
        }
    };
    if *abort.borrow() {
        debug!(unit_id = %unit_id, "Job aborted, not sending unit");
        return;
    }

    let size = payload.len();
    match router
        .dispatch(
            WorkUnitDispatch::new(unit_id.clone(), payload, attributes),
            replies,
        )
        .await
    {
        Ok(worker_id) => {
            metrics::record_unit_dispatched();
            debug!(unit_id = %unit_id, worker_id = %worker_id, bytes = size, "Unit sent");
        }
        Err(e) => warn!(unit_id = %unit_id, "Failed to dispatch unit: {}", e),
    }
}
