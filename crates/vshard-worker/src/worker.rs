//! Worker task and handle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn, Instrument};

use vshard_media::Transcoder;
use vshard_models::{WorkUnitDispatch, WorkUnitFailure, WorkUnitResult, WorkerReply};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::UnitLogger;
use crate::metrics;

pub type WorkerId = String;

/// Messages accepted by a worker.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Transcode one unit and reply on `reply_to`
    Process {
        unit: WorkUnitDispatch,
        reply_to: mpsc::UnboundedSender<WorkerReply>,
    },
    /// Stop accepting units; in-flight units still reply
    Shutdown,
}

/// Cloneable address of a running worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hand a unit to the worker.
    pub fn process(
        &self,
        unit: WorkUnitDispatch,
        reply_to: mpsc::UnboundedSender<WorkerReply>,
    ) -> WorkerResult<()> {
        self.tx
            .send(WorkerMessage::Process { unit, reply_to })
            .map_err(|_| WorkerError::closed(&self.id))
    }

    /// Whether the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Ask the worker to stop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(WorkerMessage::Shutdown);
    }
}

/// Shared state of the per-unit tasks.
struct UnitContext {
    worker_id: WorkerId,
    scratch_dir: PathBuf,
    transcoder: Arc<dyn Transcoder>,
    ffmpeg_semaphore: Arc<Semaphore>,
    /// Prefix for scratch names, unique per unit task
    next_task: AtomicU64,
}

/// A stateless transcoding worker.
pub struct Worker {
    ctx: Arc<UnitContext>,
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl Worker {
    /// Start a worker and return its handle.
    ///
    /// Units are written under `{scratch_dir}/{id}` so workers sharing a
    /// scratch directory never collide.
    pub fn spawn(
        id: impl Into<WorkerId>,
        config: WorkerConfig,
        transcoder: Arc<dyn Transcoder>,
    ) -> WorkerHandle {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self {
            ctx: Arc::new(UnitContext {
                scratch_dir: config.scratch_dir.join(&id),
                worker_id: id.clone(),
                transcoder,
                ffmpeg_semaphore: Arc::new(Semaphore::new(config.max_ffmpeg_processes.max(1))),
                next_task: AtomicU64::new(0),
            }),
            rx,
        };

        info!(
            worker_id = %id,
            max_ffmpeg_processes = config.max_ffmpeg_processes,
            "Starting worker"
        );
        tokio::spawn(worker.run());

        WorkerHandle { id, tx }
    }

    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                WorkerMessage::Process { unit, reply_to } => {
                    let ctx = Arc::clone(&self.ctx);
                    let logger = UnitLogger::new(&unit.unit_id, &ctx.worker_id);
                    let span = logger.create_span();
                    tokio::spawn(handle_unit(ctx, logger, unit, reply_to).instrument(span));
                }
                WorkerMessage::Shutdown => break,
            }
        }
        info!(worker_id = %self.ctx.worker_id, "Worker stopped");
    }
}

async fn handle_unit(
    ctx: Arc<UnitContext>,
    logger: UnitLogger,
    unit: WorkUnitDispatch,
    reply_to: mpsc::UnboundedSender<WorkerReply>,
) {
    let reply = match process_unit(&ctx, &logger, &unit).await {
        Ok(result) => {
            metrics::record_unit_outcome("ok");
            WorkerReply::Result(result)
        }
        Err(e) => {
            let kind = e.failure_kind();
            logger.log_error(&e.to_string());
            metrics::record_unit_outcome(kind.as_str());
            WorkerReply::Failure(WorkUnitFailure::new(
                kind,
                e.failure_reason(),
                unit.unit_id.clone(),
                unit.attributes.clone(),
            ))
        }
    };

    if reply_to.send(reply).is_err() {
        logger.log_warning("reply sink closed, dropping reply");
    }
}

async fn process_unit(
    ctx: &UnitContext,
    logger: &UnitLogger,
    unit: &WorkUnitDispatch,
) -> WorkerResult<WorkUnitResult> {
    let job_id = unit.unit_id.job_id()?;
    let sequence = unit.unit_id.sequence()?;
    let format = unit.attributes.output_format.clone();

    // Two attempts of the same unit may run here at once
    let task = ctx.next_task.fetch_add(1, Ordering::Relaxed);
    let input = ctx
        .scratch_dir
        .join(format!("t{}-{}", task, unit.unit_id.as_str()));
    let output = ctx
        .scratch_dir
        .join(format!("r-{}-{}-t{}.{}", job_id, sequence, task, format));

    let result = transcode_unit(ctx, logger, unit, &input, &output).await;

    remove_scratch_file(&input).await;
    remove_scratch_file(&output).await;

    let payload = result?;
    Ok(WorkUnitResult::new(unit.unit_id.clone(), payload, format))
}

async fn transcode_unit(
    ctx: &UnitContext,
    logger: &UnitLogger,
    unit: &WorkUnitDispatch,
    input: &Path,
    output: &Path,
) -> WorkerResult<Vec<u8>> {
    fs::create_dir_all(&ctx.scratch_dir).await?;
    fs::write(input, &unit.payload).await?;

    let _permit = ctx
        .ffmpeg_semaphore
        .acquire()
        .await
        .map_err(|_| WorkerError::closed(&ctx.worker_id))?;

    logger.log_start(&format!("{} bytes", unit.payload.len()));
    let started = Instant::now();

    ctx.transcoder
        .transcode(input, output, &unit.attributes)
        .await?;

    let elapsed = started.elapsed().as_secs_f64();
    metrics::record_transcode(elapsed);

    let payload = fs::read(output).await?;
    logger.log_completion(&format!("{} bytes in {:.2}s", payload.len(), elapsed));
    Ok(payload)
}

async fn remove_scratch_file(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed scratch file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove scratch file {}: {}", path.display(), e),
    }
}
