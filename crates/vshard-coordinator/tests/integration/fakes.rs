//! In-process collaborators for end-to-end coordinator tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::fs;
use tokio::sync::mpsc;

use vshard_coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorHandle, DispatchError, FailurePolicy,
    RoundRobinRouter, TrackerConfig, WorkDispatchRouter,
};
use vshard_media::{
    list_unit_files, write_manifest, MediaError, MediaResult, ScratchLayout, SplitMergeExecutor,
    Transcoder,
};
use vshard_models::{
    EncodeAttributes, FailureKind, JobId, WorkUnitDispatch, WorkUnitFailure, WorkUnitResult,
    WorkerReply,
};
use vshard_worker::{Worker, WorkerConfig, WorkerId};

/// Splits into `units` files named `{n}.{inputFormat}` holding `part-{n};`.
///
/// Merge concatenates received units in manifest order.
pub struct FakeSplitMerge {
    layout: ScratchLayout,
    units: usize,
    split_error: Option<String>,
}

impl FakeSplitMerge {
    pub fn new(root: &Path, units: usize) -> Self {
        Self {
            layout: ScratchLayout::new(root),
            units,
            split_error: None,
        }
    }

    pub fn failing_split(root: &Path, stderr: &str) -> Self {
        Self {
            split_error: Some(stderr.to_string()),
            ..Self::new(root, 0)
        }
    }
}

#[async_trait]
impl SplitMergeExecutor for FakeSplitMerge {
    async fn split(
        &self,
        _source: &Path,
        attributes: &EncodeAttributes,
        job_id: &JobId,
        _segment_secs: u32,
    ) -> MediaResult<Vec<PathBuf>> {
        if let Some(stderr) = &self.split_error {
            return Err(MediaError::SplitFailed {
                stderr: stderr.clone(),
            });
        }

        let source_dir = self.layout.source_dir(job_id);
        fs::create_dir_all(&source_dir).await?;
        fs::create_dir_all(self.layout.receive_dir(job_id)).await?;
        for n in 0..self.units {
            let file = source_dir.join(format!("{}.{}", n, attributes.input_format));
            fs::write(file, format!("part-{};", n)).await?;
        }
        list_unit_files(&source_dir).await
    }

    async fn merge(&self, job_id: &JobId, output_file_name: &str) -> MediaResult<PathBuf> {
        let receive_dir = self.layout.receive_dir(job_id);
        let units: Vec<PathBuf> = list_unit_files(&receive_dir)
            .await?
            .into_iter()
            .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some(output_file_name))
            .collect();
        if units.is_empty() {
            return Err(MediaError::NoUnitFiles(receive_dir));
        }
        write_manifest(&receive_dir, &units).await?;

        let mut merged = Vec::new();
        for unit in &units {
            merged.extend(fs::read(unit).await?);
        }
        let output = receive_dir.join(output_file_name);
        fs::write(&output, merged).await?;

        let _ = fs::remove_dir_all(self.layout.source_dir(job_id)).await;
        Ok(output)
    }
}

/// Behaviour of [`ScriptedTranscoder`] for one unit sequence.
#[derive(Debug, Clone)]
pub enum Script {
    /// Fail with this stderr every time
    Fail(String),
    /// Fail with this stderr on the first attempt only
    FailOnce(String),
    /// Never finish
    Hang,
}

/// Copies input to output unless a script entry says otherwise.
#[derive(Default)]
pub struct ScriptedTranscoder {
    scripts: HashMap<u64, Script>,
    attempts: Mutex<HashMap<u64, usize>>,
    calls: AtomicUsize,
}

impl ScriptedTranscoder {
    pub fn with_script(mut self, sequence: u64, script: Script) -> Self {
        self.scripts.insert(sequence, script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn sequence(input: &Path) -> u64 {
        let name = input.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let file = name.rsplit(vshard_models::UNIT_ID_DELIMITER).next().unwrap_or_default();
        vshard_models::sequence_of(file).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _attributes: &EncodeAttributes,
    ) -> MediaResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let sequence = Self::sequence(input);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(sequence).or_insert(0);
            *count += 1;
            *count
        };

        match self.scripts.get(&sequence) {
            Some(Script::Fail(stderr)) => {
                return Err(MediaError::tool_failed(stderr.clone(), Some(1)).into_transcode_failure());
            }
            Some(Script::FailOnce(stderr)) if attempt == 1 => {
                return Err(MediaError::tool_failed(stderr.clone(), Some(1)).into_transcode_failure());
            }
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            _ => {}
        }

        fs::copy(input, output).await?;
        Ok(())
    }
}

/// Replies to every unit directly, adding a duplicate, a malformed result
/// and a result for a job that does not exist.
pub struct NoisyRouter;

#[async_trait]
impl WorkDispatchRouter for NoisyRouter {
    async fn dispatch(
        &self,
        unit: WorkUnitDispatch,
        reply_to: mpsc::UnboundedSender<WorkerReply>,
    ) -> Result<WorkerId, DispatchError> {
        let result = WorkUnitResult::new(
            unit.unit_id.clone(),
            unit.payload.clone(),
            unit.attributes.output_format.clone(),
        );
        let stranger = WorkUnitResult::new(
            vshard_models::UnitId::new(&JobId::from_string("stranger"), "0.mp4"),
            b"nope".to_vec(),
            "mkv",
        );

        for reply in [
            WorkerReply::Result(result.clone()),
            WorkerReply::Result(result),
            WorkerReply::Result(WorkUnitResult::default()),
            WorkerReply::Result(stranger),
        ] {
            reply_to
                .send(reply)
                .map_err(|_| DispatchError::WorkerGone("noisy".into()))?;
        }
        Ok("noisy".into())
    }
}

/// Fails unit 0 on the spot and takes `delay` to deliver anything else,
/// never replying for it.
pub struct StallingRouter {
    delay: Duration,
    dispatched: AtomicUsize,
}

impl StallingRouter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            dispatched: AtomicUsize::new(0),
        }
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkDispatchRouter for StallingRouter {
    async fn dispatch(
        &self,
        unit: WorkUnitDispatch,
        reply_to: mpsc::UnboundedSender<WorkerReply>,
    ) -> Result<WorkerId, DispatchError> {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        if unit.unit_id.sequence().ok() == Some(0) {
            let failure = WorkUnitFailure::new(
                FailureKind::ExternalTool,
                "Invalid data found when processing input\n",
                unit.unit_id,
                unit.attributes,
            );
            reply_to
                .send(WorkerReply::Failure(failure))
                .map_err(|_| DispatchError::WorkerGone("stalling".into()))?;
        }
        tokio::time::sleep(self.delay).await;
        Ok("stalling".into())
    }
}

/// Scratch directory plus a running coordinator.
pub struct Harness {
    pub dir: TempDir,
    pub coordinator: CoordinatorHandle,
}

impl Harness {
    pub fn layout(&self) -> ScratchLayout {
        ScratchLayout::new(self.dir.path().join("scratch"))
    }
}

pub fn test_config(dir: &TempDir) -> CoordinatorConfig {
    CoordinatorConfig {
        scratch_root: dir.path().join("scratch"),
        segment_secs: 30,
        dispatch_batch_size: 4,
        failure_policy: FailurePolicy::FailFast,
        cleanup_failed_jobs: true,
        tracker: TrackerConfig::default(),
    }
}

/// Coordinator over a pool of in-process workers.
pub fn start_with_workers(
    config: impl FnOnce(&TempDir) -> CoordinatorConfig,
    units: usize,
    workers: usize,
    transcoder: Arc<ScriptedTranscoder>,
) -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = config(&dir);
    let executor = Arc::new(FakeSplitMerge::new(&config.scratch_root, units));

    let worker_config = WorkerConfig {
        scratch_dir: dir.path().join("workers"),
        max_ffmpeg_processes: 2,
    };
    let pool = (0..workers)
        .map(|i| Worker::spawn(format!("w{}", i), worker_config.clone(), transcoder.clone()))
        .collect();

    let coordinator = Coordinator::spawn(config, executor, Arc::new(RoundRobinRouter::new(pool)));
    Harness { dir, coordinator }
}

/// Coordinator with explicit collaborators.
pub fn start_with(
    executor: impl FnOnce(&Path) -> Arc<dyn SplitMergeExecutor>,
    router: Arc<dyn WorkDispatchRouter>,
) -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&dir);
    let executor = executor(&config.scratch_root);
    let coordinator = Coordinator::spawn(config, executor, router);
    Harness { dir, coordinator }
}

/// Poll until `check` holds or the deadline passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
