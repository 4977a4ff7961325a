use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::backend::{Backend, BackendKind, CheckMode, CloudContext, RestoreReport};
use crate::error::{Error, Result};
use crate::paths::DataPaths;
use crate::remote::{EnvironmentProbe, Remote, RemoteKind};
use crate::source::Source;
use crate::sync_state::{self, SyncRecord};
use crate::util;

/// Whether `init` had anything to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyExists,
}

/// Figures reported by one save run.
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub files_processed: u64,
    pub elapsed: Duration,
    pub size_before: u64,
    pub size_after: u64,
}

impl SaveReport {
    /// Signed growth of the repository storage across the run.
    pub fn size_delta(&self) -> i64 {
        self.size_after as i64 - self.size_before as i64
    }
}

/// Outcome of one successful remote sync.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub remote: String,
    pub kind: RemoteKind,
    pub elapsed: Duration,
    pub log: String,
}

/// One configured backup repository: a backend over its storage, the
/// sources fed into it, and the remotes its storage replicates to.
///
/// A repository moves between a handful of explicit states, always driven
/// by a caller, never in the background:
///
/// ```text
/// Unconfigured ──init──▶ Initialized ──▶ {Saving, Checking, Syncing, Restoring}
///                             ▲                      │
///                             └──────────────────────┘   (success or failure)
///                             ▲
///                             └── Mounted, until an explicit unfuse
/// ```
///
/// Storage and scratch directories are created on first use. Successful
/// syncs accumulate in an in-memory delta ([`just_synced`](Self::just_synced))
/// that the caller flushes to the sync-state store at the end of the run.
#[derive(Debug)]
pub struct Repository {
    name: String,
    backend: Backend,
    repository_path: PathBuf,
    temp_dir: PathBuf,
    transport_config: PathBuf,
    passphrase: String,
    data_paths: DataPaths,
    sources: Vec<Source>,
    remotes: Vec<Remote>,
    just_synced: Vec<SyncRecord>,
}

impl Repository {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        kind: BackendKind,
        repository_path: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        transport_config: impl Into<PathBuf>,
        passphrase: impl Into<String>,
        data_paths: DataPaths,
    ) -> Self {
        let repository_path = repository_path.into();
        let passphrase = passphrase.into();
        let backend = Backend::new(kind, &repository_path, &passphrase);
        Self {
            name: name.into(),
            backend,
            repository_path,
            temp_dir: temp_dir.into(),
            transport_config: transport_config.into(),
            passphrase,
            data_paths,
            sources: Vec::new(),
            remotes: Vec::new(),
            just_synced: Vec::new(),
        }
    }

    pub fn add_source(&mut self, source: Source) {
        self.sources.push(source);
    }

    pub fn add_remote(&mut self, remote: Remote) {
        self.remotes.push(remote);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn remotes(&self) -> &[Remote] {
        &self.remotes
    }

    /// Successful syncs of this run, to be merged into the sync-state
    /// store. Never read back by the repository itself.
    pub fn just_synced(&self) -> &[SyncRecord] {
        &self.just_synced
    }

    /// Prepare the repository storage. Safe to call unconditionally: a
    /// storage path that already exists and is non-empty short-circuits to
    /// [`InitOutcome::AlreadyExists`] without touching the backend.
    pub async fn init(&self) -> Result<InitOutcome> {
        if !util::create_or_check_empty(&self.repository_path)? {
            debug!(repository = %self.name, "storage already exists");
            return Ok(InitOutcome::AlreadyExists);
        }
        let output = self.backend.init().await?;
        if !output.is_empty() {
            debug!(repository = %self.name, "{output}");
        }
        info!(
            repository = %self.name,
            path = %self.repository_path.display(),
            "storage initialized"
        );
        Ok(InitOutcome::Created)
    }

    /// Verify storage integrity and repair from redundancy data.
    pub async fn check_and_repair(&self) -> Result<String> {
        self.backend.check(CheckMode::Repair).await
    }

    /// Run the save pipeline: `init` (aborting on failure), an optional
    /// integrity check, then the backend over every source in order.
    ///
    /// The batch is fail-fast: the first source failure fails the whole
    /// save, and sources already saved stay saved; re-running later is
    /// equivalent. One report covers the invocation, so "backup ran" is a
    /// single fact a scheduler can act on.
    pub async fn save(&self, check_before: bool) -> Result<SaveReport> {
        let started = Instant::now();
        let size_before = util::folder_size(&self.repository_path);

        self.init().await?;
        if check_before {
            self.check_and_repair().await?;
        }
        let files_processed = self.backend.save(&self.sources).await?;

        let report = SaveReport {
            files_processed,
            elapsed: started.elapsed(),
            size_before,
            size_after: util::folder_size(&self.repository_path),
        };
        info!(
            repository = %self.name,
            files = report.files_processed,
            "saved in {:.2}s",
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Sync the repository storage to one remote.
    ///
    /// The name must match a declared remote exactly, with no fuzzy
    /// matching, except that a literal absolute path is accepted
    /// undeclared, since a
    /// filesystem path is unambiguous. A name that matches nothing fails
    /// with [`Error::RemoteNotFound`]; a declared remote that did not
    /// classify (unplugged disk, unconfigured container) fails with the
    /// distinct [`Error::RemoteNotKnown`], so a typo reads differently
    /// from an unplugged disk.
    ///
    /// On success the sync is recorded in [`just_synced`](Self::just_synced).
    pub async fn sync_remote(&mut self, remote_name: &str) -> Result<SyncOutcome> {
        let remote = self.resolve_sync_target(remote_name)?;
        let started = Instant::now();
        info!(repository = %self.name, remote = %remote, "sync started");

        let log = if remote.is_cloud() {
            let metadata_file = self.data_paths.transform_metadata_file(&self.name);
            let ctx = CloudContext {
                transport_config: &self.transport_config,
                scratch_dir: &self.temp_dir,
                metadata_file: &metadata_file,
                passphrase: &self.passphrase,
            };
            self.backend.sync_to_cloud(&self.name, &remote, ctx).await?
        } else {
            self.backend.sync_to_folder(&self.name, &remote).await?
        };

        self.just_synced.push(SyncRecord {
            remote: remote.name.clone(),
            timestamp: sync_state::timestamp_now(),
        });
        let elapsed = started.elapsed();
        info!(
            repository = %self.name,
            remote = %remote.name,
            "synced in {:.2}s",
            elapsed.as_secs_f64()
        );
        Ok(SyncOutcome {
            remote: remote.name,
            kind: remote.kind,
            elapsed,
            log,
        })
    }

    fn resolve_sync_target(&self, remote_name: &str) -> Result<Remote> {
        if let Some(remote) = self.remotes.iter().find(|r| r.name == remote_name) {
            if !remote.is_known() {
                return Err(Error::RemoteNotKnown {
                    name: remote_name.to_string(),
                });
            }
            return Ok(remote.clone());
        }
        if Path::new(remote_name).is_absolute() {
            // A literal path needs no declaration to be unambiguous.
            return Ok(Remote::classify(remote_name, &EnvironmentProbe::default()));
        }
        Err(Error::RemoteNotFound {
            name: remote_name.to_string(),
        })
    }

    /// Restore the latest state of every source under
    /// `target/<source name>`. Best-effort across sources, unlike `save`:
    /// each source is attempted and the report carries every outcome.
    pub async fn restore(&self, target: &Path) -> Result<RestoreReport> {
        if !util::create_or_check_empty(target)? {
            return Err(Error::DirectoryNotEmpty {
                path: target.display().to_string(),
            });
        }
        Ok(self.backend.restore(&self.sources, target).await)
    }

    /// Pull the repository copy held by a remote back into `target`. The
    /// identifier resolves first as a remote name, then as a remote's full
    /// path, so folder remotes can be addressed either way.
    pub async fn recover(&self, remote_or_path: &str, target: &Path) -> Result<String> {
        let remote = self.resolve_recovery_source(remote_or_path)?;
        if remote.is_cloud() {
            let metadata_file = self.data_paths.transform_metadata_file(&self.name);
            let ctx = CloudContext {
                transport_config: &self.transport_config,
                scratch_dir: &self.temp_dir,
                metadata_file: &metadata_file,
                passphrase: &self.passphrase,
            };
            self.backend
                .recover_from_cloud(&self.name, &remote, target, ctx)
                .await
        } else {
            self.backend.recover_from_folder(&remote, target).await
        }
    }

    fn resolve_recovery_source(&self, identifier: &str) -> Result<Remote> {
        let remote = self
            .remotes
            .iter()
            .find(|r| r.name == identifier)
            .or_else(|| {
                self.remotes
                    .iter()
                    .find(|r| r.full_path.as_deref() == Some(Path::new(identifier)))
            })
            .ok_or_else(|| Error::RemoteNotFound {
                name: identifier.to_string(),
            })?;
        if !remote.is_known() {
            return Err(Error::RemoteNotKnown {
                name: remote.name.clone(),
            });
        }
        Ok(remote.clone())
    }

    /// Mount the repository for browsing at `point`.
    pub async fn fuse(&self, point: &Path) -> Result<()> {
        self.backend.fuse(point).await
    }

    /// Best-effort unmount; never fails the caller.
    pub async fn unfuse(&self, point: &Path) {
        self.backend.unfuse(point).await;
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) at {}",
            self.name,
            self.backend.kind(),
            self.repository_path.display()
        )?;
        for source in &self.sources {
            write!(f, "\n  source: {source}")?;
        }
        for remote in &self.remotes {
            write!(f, "\n  remote: {remote}")?;
        }
        Ok(())
    }
}
