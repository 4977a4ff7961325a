pub mod bup;
pub mod encfs;
pub mod rclone;
pub mod restic;
pub mod rsync;

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{info, warn};

pub use bup::BupBackend;
pub use restic::ResticBackend;

use crate::error::{Error, Result};
use crate::remote::Remote;
use crate::source::Source;
use crate::{mounts, sync_state, util};

/// Which engine a repository is stored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Bup,
    Restic,
}

impl BackendKind {
    /// The engine binary this kind shells out to.
    pub fn binary(self) -> &'static str {
        match self {
            BackendKind::Bup => "bup",
            BackendKind::Restic => "restic",
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bup" => Ok(BackendKind::Bup),
            "restic" => Ok(BackendKind::Restic),
            other => Err(Error::UnknownBackend {
                kind: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Integrity pass selector: generate fresh redundancy data, or verify and
/// repair from it. Two separate passes, never one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    Generate,
    Repair,
}

/// Everything a cloud transfer needs besides the repository itself.
#[derive(Debug, Clone, Copy)]
pub struct CloudContext<'a> {
    pub transport_config: &'a Path,
    pub scratch_dir: &'a Path,
    pub metadata_file: &'a Path,
    pub passphrase: &'a str,
}

/// Per-source outcome of a best-effort restore.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: String,
    pub success: bool,
    pub detail: String,
}

/// Aggregate outcome of a restore across sources. A partial restore is
/// still useful to the operator, so every source appears here.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl RestoreReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.success)
    }
}

/// The closed set of engines behind one contract, selected once at
/// repository construction. Engine-specific behavior stays behind the
/// match arms; the folder and cloud replication flows are shared.
#[derive(Debug, Clone)]
pub enum Backend {
    Bup(BupBackend),
    Restic(ResticBackend),
}

impl Backend {
    pub fn new(kind: BackendKind, repository_path: &Path, passphrase: &str) -> Self {
        match kind {
            BackendKind::Bup => Backend::Bup(BupBackend::new(repository_path)),
            BackendKind::Restic => {
                Backend::Restic(ResticBackend::new(repository_path, passphrase))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Bup(_) => BackendKind::Bup,
            Backend::Restic(_) => BackendKind::Restic,
        }
    }

    pub fn repository_path(&self) -> &Path {
        match self {
            Backend::Bup(backend) => backend.repository_path(),
            Backend::Restic(backend) => backend.repository_path(),
        }
    }

    pub async fn init(&self) -> Result<String> {
        let output = match self {
            Backend::Bup(backend) => backend.init().await?,
            Backend::Restic(backend) => backend.init().await?,
        };
        Ok(output.combined())
    }

    pub async fn check(&self, mode: CheckMode) -> Result<String> {
        let output = match self {
            Backend::Bup(backend) => backend.check(mode).await?,
            // One restic check covers both integrity modes.
            Backend::Restic(backend) => backend.check().await?,
        };
        Ok(output.combined())
    }

    /// Fail-fast across sources; the first failure stops the batch.
    /// Returns the total number of entries the engine reports processed.
    pub async fn save(&self, sources: &[Source]) -> Result<u64> {
        match self {
            Backend::Bup(backend) => backend.save_all(sources).await,
            Backend::Restic(backend) => backend.save_all(sources).await,
        }
    }

    /// Best-effort across sources: every source is attempted and the
    /// outcomes aggregated, unlike [`save`](Self::save).
    pub async fn restore(&self, sources: &[Source], target: &Path) -> RestoreReport {
        let mut report = RestoreReport::default();
        for source in sources {
            let result = match self {
                Backend::Bup(backend) => backend.restore_source(source, target).await,
                Backend::Restic(backend) => backend.restore_source(source, target).await,
            };
            let outcome = match result {
                Ok(output) => SourceOutcome {
                    source: source.name.clone(),
                    success: true,
                    detail: output.combined(),
                },
                Err(err) => {
                    warn!(source = %source.name, "restore failed: {err}");
                    SourceOutcome {
                        source: source.name.clone(),
                        success: false,
                        detail: err.to_string(),
                    }
                }
            };
            report.outcomes.push(outcome);
        }
        report
    }

    /// Expose the repository as a browsable tree at `point`, which must be
    /// empty and not already mounted.
    pub async fn fuse(&self, point: &Path) -> Result<()> {
        if !util::create_or_check_empty(point)? {
            return Err(Error::DirectoryNotEmpty {
                path: point.display().to_string(),
            });
        }
        if mounts::is_fuse_mounted(point)? {
            return Err(Error::AlreadyMounted {
                path: point.display().to_string(),
            });
        }
        match self {
            Backend::Bup(backend) => {
                backend.fuse(point).await?;
            }
            Backend::Restic(backend) => backend.mount(point).await?,
        }
        info!(point = %point.display(), "repository mounted");
        Ok(())
    }

    /// Cleanup op: unconditional best-effort unmount, never fails the
    /// caller.
    pub async fn unfuse(&self, point: &Path) {
        match mounts::is_fuse_mounted(point) {
            Ok(true) => {
                if let Err(err) = mounts::unmount(point).await {
                    warn!(point = %point.display(), "unmount failed: {err}");
                }
            }
            Ok(false) => {}
            Err(err) => warn!(point = %point.display(), "mount table unreadable: {err}"),
        }
    }

    /// Verbatim mirror of the repository storage to a folder remote, plus
    /// a refresh of the remote-side sync marker.
    pub async fn sync_to_folder(&self, repository: &str, remote: &Remote) -> Result<String> {
        let dest = known_path(remote)?;
        fs::create_dir_all(dest)?;
        let output = rsync::mirror(self.repository_path(), dest).await?;
        sync_state::update_sync_marker(dest, repository, &sync_state::timestamp_now())?;
        Ok(output.combined())
    }

    /// Stage the repository through a reverse transform mount and transfer
    /// the encrypted view to the cloud remote. The transform metadata is
    /// stashed before the transfer; the mount is torn down on every path.
    pub async fn sync_to_cloud(
        &self,
        repository: &str,
        remote: &Remote,
        ctx: CloudContext<'_>,
    ) -> Result<String> {
        let mount =
            encfs::ReverseMount::establish(self.repository_path(), ctx.scratch_dir, ctx.passphrase)
                .await?;
        let transfer = self.transfer_to_cloud(repository, remote, &ctx).await;
        let teardown = mount.tear_down().await;
        match (transfer, teardown) {
            (Ok(message), Ok(())) => Ok(message),
            // Transferred, but the scratch mount is stuck: surface it.
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(teardown_err)) => {
                warn!("unmount after failed transfer also failed: {teardown_err}");
                Err(err)
            }
        }
    }

    async fn transfer_to_cloud(
        &self,
        repository: &str,
        remote: &Remote,
        ctx: &CloudContext<'_>,
    ) -> Result<String> {
        encfs::stash_metadata(self.repository_path(), ctx.metadata_file)?;
        let container = rclone::container_for(&remote.name, repository);
        let output = rclone::sync(ctx.transport_config, ctx.scratch_dir, &container).await?;
        Ok(output.combined())
    }

    /// Fetch the transformed tree from the cloud remote and mount its
    /// decrypted view at `target`. Fails up front without the stashed
    /// transform metadata, which is the only way to reverse the copy.
    pub async fn recover_from_cloud(
        &self,
        repository: &str,
        remote: &Remote,
        target: &Path,
        ctx: CloudContext<'_>,
    ) -> Result<String> {
        if !util::create_or_check_empty(target)? {
            return Err(Error::DirectoryNotEmpty {
                path: target.display().to_string(),
            });
        }
        if !util::create_or_check_empty(ctx.scratch_dir)? {
            return Err(Error::DirectoryNotEmpty {
                path: ctx.scratch_dir.display().to_string(),
            });
        }
        if mounts::is_fuse_mounted(ctx.scratch_dir)? {
            return Err(Error::AlreadyMounted {
                path: ctx.scratch_dir.display().to_string(),
            });
        }
        let metadata = encfs::stored_metadata(ctx.metadata_file, repository)?;
        let container = rclone::container_for(&remote.name, repository);
        rclone::copy(ctx.transport_config, &container, ctx.scratch_dir).await?;
        encfs::mount_decrypted(ctx.scratch_dir, target, &metadata, ctx.passphrase).await?;
        Ok(format!(
            "decrypted view of {repository} mounted at {}",
            target.display()
        ))
    }

    /// Mirror back the repository copy held by a folder remote.
    pub async fn recover_from_folder(&self, remote: &Remote, target: &Path) -> Result<String> {
        if !util::create_or_check_empty(target)? {
            return Err(Error::DirectoryNotEmpty {
                path: target.display().to_string(),
            });
        }
        let dest = known_path(remote)?;
        let stored = match self.repository_path().file_name() {
            Some(dir_name) => dest.join(dir_name),
            None => {
                return Err(Error::RemoteCopyMissing {
                    remote: remote.name.clone(),
                });
            }
        };
        if !stored.is_dir() {
            return Err(Error::RemoteCopyMissing {
                remote: remote.name.clone(),
            });
        }
        let output = rsync::mirror(&stored, target).await?;
        Ok(output.combined())
    }
}

fn known_path(remote: &Remote) -> Result<&Path> {
    remote.full_path.as_deref().ok_or_else(|| Error::RemoteNotKnown {
        name: remote.name.clone(),
    })
}
