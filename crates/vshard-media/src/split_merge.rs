//! Splitting a source into units and merging received units.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{info, warn};

use vshard_models::{attributes::DEFAULT_INPUT_FORMAT, EncodeAttributes, JobId};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};
use crate::layout::ScratchLayout;
use crate::manifest::{list_unit_files, write_manifest};

/// Cuts sources into units and stitches received units back together.
#[async_trait]
pub trait SplitMergeExecutor: Send + Sync {
    /// Split `source` into `{root}/{jobId}/{n}.{inputFormat}` units and create
    /// the receive directory. Returns the units in sequence order.
    async fn split(
        &self,
        source: &Path,
        attributes: &EncodeAttributes,
        job_id: &JobId,
        segment_secs: u32,
    ) -> MediaResult<Vec<PathBuf>>;

    /// Merge every received unit of `job_id` into
    /// `{root}/res-{jobId}/{output_file_name}` and return that path.
    async fn merge(&self, job_id: &JobId, output_file_name: &str) -> MediaResult<PathBuf>;
}

/// FFmpeg-backed split/merge.
#[derive(Debug, Clone)]
pub struct FfmpegSplitMerge {
    layout: ScratchLayout,
    runner: FfmpegRunner,
}

impl FfmpegSplitMerge {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            layout: ScratchLayout::new(&config.scratch_root),
            runner: FfmpegRunner::new(&config.ffmpeg_path).with_timeout(config.tool_timeout_secs),
        }
    }

    pub fn layout(&self) -> &ScratchLayout {
        &self.layout
    }
}

#[async_trait]
impl SplitMergeExecutor for FfmpegSplitMerge {
    async fn split(
        &self,
        source: &Path,
        attributes: &EncodeAttributes,
        job_id: &JobId,
        segment_secs: u32,
    ) -> MediaResult<Vec<PathBuf>> {
        if fs::metadata(source).await.is_err() {
            return Err(MediaError::SourceNotFound(source.to_path_buf()));
        }

        let output_dir = self.layout.source_dir(job_id);
        let receive_dir = self.layout.receive_dir(job_id);

        fs::create_dir_all(self.layout.root()).await?;
        // Fresh job ids never collide; an existing directory means reuse of an id
        fs::create_dir(&output_dir).await?;
        fs::create_dir(&receive_dir).await?;

        let input_format = if attributes.input_format.is_empty() {
            DEFAULT_INPUT_FORMAT
        } else {
            attributes.input_format.as_str()
        };
        let pattern = output_dir.join(format!("%d.{}", input_format));

        let cmd = FfmpegCommand::new(source, pattern)
            .output_args(["-map", "0", "-f", "segment", "-reset_timestamps", "1"])
            .output_arg("-segment_time")
            .output_arg(segment_secs.to_string())
            .stream_copy();

        self.runner
            .run(&cmd)
            .await
            .map_err(MediaError::into_split_failure)?;

        let units = list_unit_files(&output_dir).await?;
        info!(
            job_id = %job_id,
            units = units.len(),
            segment_secs,
            "Split source into units"
        );
        Ok(units)
    }

    async fn merge(&self, job_id: &JobId, output_file_name: &str) -> MediaResult<PathBuf> {
        let receive_dir = self.layout.receive_dir(job_id);
        if fs::metadata(&receive_dir).await.is_err() {
            return Err(MediaError::NoUnitFiles(receive_dir));
        }

        let units: Vec<PathBuf> = list_unit_files(&receive_dir)
            .await?
            .into_iter()
            .filter(|path| path.file_name().and_then(|n| n.to_str()) != Some(output_file_name))
            .collect();
        if units.is_empty() {
            return Err(MediaError::NoUnitFiles(receive_dir));
        }

        let manifest = write_manifest(&receive_dir, &units).await?;
        let output = receive_dir.join(output_file_name);

        let cmd = FfmpegCommand::new(&manifest, &output)
            .input_args(["-f", "concat", "-safe", "0"])
            .stream_copy();

        self.runner
            .run(&cmd)
            .await
            .map_err(MediaError::into_merge_failure)?;

        // Split units are no longer needed once the artifact exists
        let source_dir = self.layout.source_dir(job_id);
        if self.layout.is_job_dir(&source_dir) {
            if let Err(e) = fs::remove_dir_all(&source_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        job_id = %job_id,
                        "Failed to remove split directory {}: {}",
                        source_dir.display(),
                        e
                    );
                }
            }
        }

        info!(
            job_id = %job_id,
            units = units.len(),
            output = %output.display(),
            "Merged units"
        );
        Ok(output)
    }
}
