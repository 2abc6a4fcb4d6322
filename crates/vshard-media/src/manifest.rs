//! Unit ordering and the concat manifest.

use std::path::{Path, PathBuf};

use tokio::fs;
use vshard_models::sequence_of;

use crate::error::MediaResult;

/// File listing the received units for the concat demuxer.
pub const MANIFEST_FILE_NAME: &str = "list.txt";

/// Keep files whose name carries a numeric sequence and sort them by it.
///
/// Sorting is numeric: `2.mp4` comes before `10.mp4`.
pub fn order_unit_files(files: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut units: Vec<(u64, PathBuf)> = files
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            sequence_of(name).map(|seq| (seq, path.clone()))
        })
        .collect();
    units.sort_by_key(|(seq, _)| *seq);
    units.into_iter().map(|(_, path)| path).collect()
}

/// Render the manifest, one `file '<absolute-path>'` line per unit.
pub fn render_manifest(files: &[PathBuf]) -> String {
    let mut out = String::new();
    for file in files {
        let path = std::path::absolute(file).unwrap_or_else(|_| file.clone());
        // Single quotes are closed, escaped and reopened for the concat demuxer
        let escaped = path.to_string_lossy().replace('\'', r"'\''");
        out.push_str("file '");
        out.push_str(&escaped);
        out.push_str("'\n");
    }
    out
}

/// Write the manifest into `dir` and return its path.
pub async fn write_manifest(dir: &Path, files: &[PathBuf]) -> MediaResult<PathBuf> {
    let manifest = dir.join(MANIFEST_FILE_NAME);
    fs::write(&manifest, render_manifest(files)).await?;
    Ok(manifest)
}

/// List the sequence-named files of a directory in numeric order.
pub async fn list_unit_files(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    Ok(order_unit_files(files))
}
