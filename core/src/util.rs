use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;

/// Create `path` if absent and report whether it is empty. The common
/// precondition for storage dirs, mount points and restore targets.
pub fn create_or_check_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        return Ok(true);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Total size in bytes of every file under `root`. A missing tree counts
/// as zero (a repository that has not been initialized yet).
pub fn folder_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// Human-readable byte count with one decimal: `12.4Mb`.
pub fn readable_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["b", "Kb", "Mb", "Gb"] {
        if size < 1024.0 {
            return format!("{size:.1}{unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1}Tb")
}
