//! Removal of failed jobs' scratch directories.

use std::io;

use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vshard_media::ScratchLayout;
use vshard_models::JobId;

/// Remove `{root}/{jobId}` and `{root}/res-{jobId}`.
///
/// Missing directories are not an error. Paths outside the scratch root are
/// never touched.
pub async fn reap_job(layout: &ScratchLayout, job_id: &JobId) -> io::Result<()> {
    for dir in [layout.source_dir(job_id), layout.receive_dir(job_id)] {
        if !layout.is_job_dir(&dir) {
            warn!(job_id = %job_id, "Refusing to remove {}", dir.display());
            continue;
        }
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reap a job in the background.
pub fn spawn_reap(layout: ScratchLayout, job_id: JobId) -> JoinHandle<()> {
    tokio::spawn(async move {
        match reap_job(&layout, &job_id).await {
            Ok(()) => info!(job_id = %job_id, "Removed scratch directories of failed job"),
            Err(e) => warn!(job_id = %job_id, "Failed to remove scratch directories: {}", e),
        }
    })
}
