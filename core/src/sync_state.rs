use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::debug;

use crate::error::Result;

/// `repository → {remote → timestamp}`.
pub type StateMap = BTreeMap<String, BTreeMap<String, String>>;

/// One successful sync, recorded in memory until the end of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub remote: String,
    pub timestamp: String,
}

/// Sync stamps use a fixed minute-resolution format: `2026-08-23_14h02`.
pub fn timestamp_now() -> String {
    Local::now().format("%Y-%m-%d_%Hh%M").to_string()
}

/// The persisted last-synced store: one YAML mapping per user, merged and
/// rewritten whole after every sync batch. No locking; concurrent runs are
/// unsupported.
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole store; an absent or empty file is an empty mapping.
    pub fn load(&self) -> Result<StateMap> {
        read_state_map(&self.path)
    }

    /// Merge every non-empty delta into the store and write it back.
    /// Last write wins per (repository, remote) pair.
    pub fn export<'a, I>(&self, deltas: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a [SyncRecord])>,
    {
        let mut state = self.load()?;
        let mut touched = false;
        for (repository, records) in deltas {
            if records.is_empty() {
                continue;
            }
            let entry = state.entry(repository.to_string()).or_default();
            for record in records {
                entry.insert(record.remote.clone(), record.timestamp.clone());
            }
            touched = true;
        }
        if !touched {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_yaml::to_string(&state)?)?;
        debug!(path = %self.path.display(), "sync state exported");
        Ok(())
    }
}

/// Write or refresh the `last_synced.yaml` marker kept beside the data on
/// folder remotes.
pub fn update_sync_marker(dir: &Path, repository: &str, timestamp: &str) -> Result<()> {
    let path = dir.join("last_synced.yaml");
    let mut marker: BTreeMap<String, String> = read_state_map_flat(&path)?;
    marker.insert(repository.to_string(), timestamp.to_string());
    fs::write(&path, serde_yaml::to_string(&marker)?)?;
    Ok(())
}

fn read_state_map(path: &Path) -> Result<StateMap> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(StateMap::new()),
        Ok(text) => Ok(serde_yaml::from_str(&text)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(StateMap::new()),
        Err(err) => Err(err.into()),
    }
}

fn read_state_map_flat(path: &Path) -> Result<BTreeMap<String, String>> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(text) => Ok(serde_yaml::from_str(&text)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn record(remote: &str, timestamp: &str) -> SyncRecord {
        SyncRecord {
            remote: remote.to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    #[test]
    fn timestamp_has_the_fixed_shape() {
        let stamp = timestamp_now();
        assert!(NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d_%Hh%M").is_ok());
    }

    #[test]
    fn absent_store_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path().join("last_synced.yaml"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn disjoint_exports_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path().join("last_synced.yaml"));

        let first = [record("bdisk", "2026-08-01_10h00")];
        store.export([("docs", &first[..])]).unwrap();
        let second = [record("gdrive", "2026-08-02_11h30")];
        store.export([("docs", &second[..])]).unwrap();

        let state = store.load().unwrap();
        let docs = &state["docs"];
        assert_eq!(docs["bdisk"], "2026-08-01_10h00");
        assert_eq!(docs["gdrive"], "2026-08-02_11h30");
    }

    #[test]
    fn last_write_wins_within_one_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path().join("last_synced.yaml"));

        let delta = [
            record("bdisk", "2026-08-01_10h00"),
            record("bdisk", "2026-08-01_10h05"),
        ];
        store.export([("docs", &delta[..])]).unwrap();
        assert_eq!(store.load().unwrap()["docs"]["bdisk"], "2026-08-01_10h05");
    }

    #[test]
    fn empty_deltas_do_not_create_entries_or_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path().join("last_synced.yaml"));
        store.export([("docs", &[][..])]).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn marker_accumulates_repositories() {
        let dir = tempfile::tempdir().unwrap();
        update_sync_marker(dir.path(), "docs", "2026-08-01_10h00").unwrap();
        update_sync_marker(dir.path(), "music", "2026-08-01_10h01").unwrap();
        update_sync_marker(dir.path(), "docs", "2026-08-02_09h00").unwrap();

        let text = fs::read_to_string(dir.path().join("last_synced.yaml")).unwrap();
        let marker: BTreeMap<String, String> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(marker["docs"], "2026-08-02_09h00");
        assert_eq!(marker["music"], "2026-08-01_10h01");
    }
}
