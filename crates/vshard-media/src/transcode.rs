//! Transcoding a single unit.

use std::path::Path;

use async_trait::async_trait;

use vshard_models::EncodeAttributes;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};

/// Turns one raw unit into one encoded unit.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        attributes: &EncodeAttributes,
    ) -> MediaResult<()>;
}

/// FFmpeg-backed transcoder; the attribute bag becomes the output arguments.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
}

impl FfmpegTranscoder {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            runner: FfmpegRunner::new(&config.ffmpeg_path).with_timeout(config.tool_timeout_secs),
        }
    }

    /// Build the command for one unit.
    pub fn command(input: &Path, output: &Path, attributes: &EncodeAttributes) -> FfmpegCommand {
        FfmpegCommand::new(input, output).output_args(attributes.to_output_args())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        attributes: &EncodeAttributes,
    ) -> MediaResult<()> {
        self.runner
            .run(&Self::command(input, output, attributes))
            .await
            .map_err(MediaError::into_transcode_failure)
    }
}
