use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::backend::CheckMode;
use crate::error::Result;
use crate::exec::{ToolCommand, ToolOutput};
use crate::source::Source;

/// Incremental-index engine: one long-lived repository addressed through
/// `BUP_DIR`; each source is indexed, saved under its own branch name,
/// then covered by par2 redundancy data.
#[derive(Debug, Clone)]
pub struct BupBackend {
    repository_path: PathBuf,
}

impl BupBackend {
    pub fn new(repository_path: impl Into<PathBuf>) -> Self {
        Self {
            repository_path: repository_path.into(),
        }
    }

    pub fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new("bup").env("BUP_DIR", &self.repository_path)
    }

    pub async fn init(&self) -> Result<ToolOutput> {
        self.command().arg("init").run().await
    }

    /// `fsck -g` generates fresh par2 recovery data, `fsck -r` verifies
    /// and repairs from it. The two are separate passes, never combined.
    pub async fn check(&self, mode: CheckMode) -> Result<ToolOutput> {
        let flag = match mode {
            CheckMode::Generate => "-g",
            CheckMode::Repair => "-r",
        };
        self.command()
            .arg("fsck")
            .arg("-v")
            .arg("-j8")
            .arg(flag)
            .run()
            .await
    }

    /// Fail-fast batch: index, save, then regenerate redundancy data per
    /// source, in order, stopping at the first failure. Returns the
    /// number of index entries processed.
    pub async fn save_all(&self, sources: &[Source]) -> Result<u64> {
        let mut entries = 0;
        for source in sources {
            entries += self.index(source).await?;
            self.save(source).await?;
            self.check(CheckMode::Generate).await?;
            info!(source = %source.name, "source saved");
        }
        Ok(entries)
    }

    async fn index(&self, source: &Source) -> Result<u64> {
        let mut command = self.command().arg("index").arg("-vv");
        if let Some(pattern) = exclusion_pattern(&source.excluded_extensions) {
            command = command.arg(format!("--exclude-rx={pattern}"));
        }
        let output = command.arg(&source.target_dir).run().await?;
        let entries = count_index_entries(&output);
        debug!(source = %source.name, entries, "indexed");
        Ok(entries)
    }

    async fn save(&self, source: &Source) -> Result<ToolOutput> {
        self.command()
            .arg("save")
            .arg("-vv")
            .arg(&source.target_dir)
            .arg("-n")
            .arg(&source.name)
            .arg(format!("--strip-path={}", source.target_dir.display()))
            .arg("-9")
            .run()
            .await
    }

    /// Latest state of one source, under `target/<source.name>`.
    pub async fn restore_source(&self, source: &Source, target: &Path) -> Result<ToolOutput> {
        self.command()
            .arg("restore")
            .arg("-C")
            .arg(target.join(&source.name))
            .arg(format!("/{}/latest/.", source.name))
            .run()
            .await
    }

    pub async fn fuse(&self, point: &Path) -> Result<ToolOutput> {
        self.command().arg("fuse").arg(point).run().await
    }
}

/// One anchored regex covering every excluded extension.
fn exclusion_pattern(extensions: &[String]) -> Option<String> {
    if extensions.is_empty() {
        return None;
    }
    Some(format!("^.*\\.({})$", extensions.join("|")))
}

/// `index -vv` prints one line per visited entry, directories included.
fn count_index_entries(output: &ToolOutput) -> u64 {
    output
        .combined()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count() as u64
}
