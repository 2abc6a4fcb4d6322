//! FFmpeg CLI wrapper for distributed transcoding.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A runner that captures tool stderr verbatim and parses `-progress pipe:2`
//! - The scratch directory layout shared by coordinator and merge
//! - Numeric unit ordering and the concat manifest
//! - `SplitMergeExecutor` and `Transcoder` seams with FFmpeg implementations

pub mod command;
pub mod config;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod progress;
pub mod split_merge;
pub mod transcode;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use config::MediaConfig;
pub use error::{MediaError, MediaResult};
pub use layout::ScratchLayout;
pub use manifest::{
    list_unit_files, order_unit_files, render_manifest, write_manifest, MANIFEST_FILE_NAME,
};
pub use progress::FfmpegProgress;
pub use split_merge::{FfmpegSplitMerge, SplitMergeExecutor};
pub use transcode::{FfmpegTranscoder, Transcoder};
