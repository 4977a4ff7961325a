use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{Error, Result};

/// Per-user data locations: the sync-state store and the stash of
/// reversible-transform metadata, both keyed by repository name.
#[derive(Debug, Clone)]
pub struct DataPaths {
    base: PathBuf,
}

impl DataPaths {
    /// Resolve against the platform data directory (`~/.local/share/loft`
    /// on Linux).
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "loft").ok_or(Error::DataDirUnavailable)?;
        Ok(Self::with_base(dirs.data_dir().to_path_buf()))
    }

    /// Anchor everything under an explicit base instead of the platform
    /// default.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The persisted sync-state store.
    pub fn sync_state_file(&self) -> PathBuf {
        self.base.join("last_synced.yaml")
    }

    /// Directory holding one transform-metadata artifact per repository.
    pub fn transform_metadata_dir(&self) -> PathBuf {
        self.base.join("encfs")
    }

    pub fn transform_metadata_file(&self, repository: &str) -> PathBuf {
        self.transform_metadata_dir().join(format!("{repository}.xml"))
    }

    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.transform_metadata_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_hangs_off_the_base() {
        let paths = DataPaths::with_base("/data/loft");
        assert_eq!(
            paths.sync_state_file(),
            PathBuf::from("/data/loft/last_synced.yaml")
        );
        assert_eq!(
            paths.transform_metadata_file("documents"),
            PathBuf::from("/data/loft/encfs/documents.xml")
        );
    }

    #[test]
    fn ensure_layout_creates_the_metadata_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::with_base(dir.path().join("loft"));
        paths.ensure_layout().unwrap();
        assert!(paths.transform_metadata_dir().is_dir());
    }
}
