//! Worker configuration.

use std::path::PathBuf;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Scratch directory for unit inputs and outputs
    pub scratch_dir: PathBuf,
    /// Maximum concurrent FFmpeg processes per worker
    pub max_ffmpeg_processes: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("vshard-worker"),
            max_ffmpeg_processes: 4,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            scratch_dir: std::env::var("VSHARD_WORKER_SCRATCH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("vshard-worker")),
            max_ffmpeg_processes: std::env::var("VSHARD_WORKER_MAX_FFMPEG")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(4),
        }
    }
}
