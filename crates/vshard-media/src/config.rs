//! Media configuration.

use std::path::PathBuf;

/// Where the tool lives and where scratch files go.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// FFmpeg binary (name on PATH or absolute path)
    pub ffmpeg_path: PathBuf,
    /// Root of the split/receive scratch layout
    pub scratch_root: PathBuf,
    /// Kill a single tool invocation after this many seconds
    pub tool_timeout_secs: Option<u64>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            scratch_root: std::env::temp_dir().join("vshard"),
            tool_timeout_secs: None,
        }
    }
}

impl MediaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg_path: std::env::var("VSHARD_FFMPEG")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            scratch_root: std::env::var("VSHARD_SCRATCH_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_root),
            tool_timeout_secs: std::env::var("VSHARD_TOOL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}
