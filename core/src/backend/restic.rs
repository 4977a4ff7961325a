use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::exec::{ToolCommand, ToolOutput};
use crate::source::Source;

/// Snapshot engine: every save is an independently addressable snapshot,
/// so restoring a source means discovering the newest snapshot that covers
/// its directory. Addressed through `RESTIC_REPOSITORY`/`RESTIC_PASSWORD`.
#[derive(Debug, Clone)]
pub struct ResticBackend {
    repository_path: PathBuf,
    passphrase: String,
}

impl ResticBackend {
    pub fn new(repository_path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        Self {
            repository_path: repository_path.into(),
            passphrase: passphrase.into(),
        }
    }

    pub fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new("restic")
            .env("RESTIC_REPOSITORY", &self.repository_path)
            .env("RESTIC_PASSWORD", self.passphrase.as_str())
    }

    pub async fn init(&self) -> Result<ToolOutput> {
        self.command().arg("init").run().await
    }

    pub async fn check(&self) -> Result<ToolOutput> {
        self.command().arg("check").run().await
    }

    /// Fail-fast batch, one snapshot per source. Returns the total number
    /// of files restic reports processed.
    pub async fn save_all(&self, sources: &[Source]) -> Result<u64> {
        let mut files = 0;
        for source in sources {
            files += self.backup(source).await?;
            info!(source = %source.name, "snapshot taken");
        }
        Ok(files)
    }

    async fn backup(&self, source: &Source) -> Result<u64> {
        let mut command = self.command().arg("backup").arg("--json");
        for extension in &source.excluded_extensions {
            command = command.arg(format!("--exclude=*.{extension}"));
        }
        let output = command.arg(&source.target_dir).run().await?;
        Ok(summary_files_processed(&output.stdout))
    }

    async fn snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        let output = self.command().arg("snapshots").arg("--json").run().await?;
        Ok(serde_json::from_str(&output.stdout)?)
    }

    /// Latest state of one source, under `target/<source.name>`.
    pub async fn restore_source(&self, source: &Source, target: &Path) -> Result<ToolOutput> {
        let snapshots = self.snapshots().await?;
        let snapshot =
            latest_covering(&snapshots, &source.target_dir).ok_or(Error::SnapshotMissing {
                dir: source.target_dir.display().to_string(),
            })?;
        debug!(snapshot = %snapshot.short_id, source = %source.name, "restoring");
        self.command()
            .arg("restore")
            .arg(format!(
                "{}:{}",
                snapshot.short_id,
                source.target_dir.display()
            ))
            .arg("--target")
            .arg(target.join(&source.name))
            .run()
            .await
    }

    /// `restic mount` serves the repository until unmounted, so it is
    /// spawned and released rather than awaited.
    pub async fn mount(&self, point: &Path) -> Result<()> {
        self.command()
            .arg("mount")
            .arg(point)
            .spawn_released(Duration::from_secs(1))
            .await
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotInfo {
    pub short_id: String,
    pub time: DateTime<FixedOffset>,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

fn latest_covering<'a>(snapshots: &'a [SnapshotInfo], dir: &Path) -> Option<&'a SnapshotInfo> {
    snapshots
        .iter()
        .filter(|snapshot| snapshot.paths.iter().any(|path| path == dir))
        .max_by_key(|snapshot| snapshot.time)
}

#[derive(Debug, Deserialize)]
struct BackupMessage {
    message_type: String,
    #[serde(default)]
    total_files_processed: u64,
}

/// `backup --json` emits one JSON object per line; the summary line
/// carries the processed-file count.
fn summary_files_processed(stdout: &str) -> u64 {
    stdout
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<BackupMessage>(line).ok())
        .find(|message| message.message_type == "summary")
        .map(|message| message.total_files_processed)
        .unwrap_or(0)
}
