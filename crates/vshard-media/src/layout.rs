//! Scratch directory layout.
//!
//! ```text
//! {root}/{jobId}/            raw split units
//! {root}/res-{jobId}/        received units, list.txt, merged artifact
//! ```

use std::path::{Path, PathBuf};

use vshard_models::{IdResult, JobId, UnitId};

/// Prefix of the directory holding received units.
pub const RECEIVE_DIR_PREFIX: &str = "res-";

/// Paths under the configured scratch root.
#[derive(Debug, Clone)]
pub struct ScratchLayout {
    root: PathBuf,
}

impl ScratchLayout {
    /// Create a layout rooted at `root`; relative roots are made absolute.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the raw split units of a job.
    pub fn source_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }

    /// Directory holding received units of a job.
    pub fn receive_dir(&self, job_id: &JobId) -> PathBuf {
        self.root
            .join(format!("{}{}", RECEIVE_DIR_PREFIX, job_id.as_str()))
    }

    /// Raw split file backing a unit.
    pub fn unit_source_file(&self, unit_id: &UnitId) -> IdResult<PathBuf> {
        Ok(self
            .source_dir(&unit_id.job_id()?)
            .join(unit_id.file_name()?))
    }

    /// Where a received unit encoded as `format` is persisted.
    pub fn received_unit_file(&self, unit_id: &UnitId, format: &str) -> IdResult<PathBuf> {
        Ok(self
            .receive_dir(&unit_id.job_id()?)
            .join(unit_id.result_file_name(format)?))
    }

    /// Whether `path` sits directly under the scratch root.
    pub fn is_job_dir(&self, path: &Path) -> bool {
        path.parent() == Some(self.root.as_path())
    }
}
