//! Reversible-transform staging for cloud remotes.
//!
//! A reverse encfs mount exposes the plaintext repository as an encrypted
//! view, which is what actually travels to the cloud. The transform is
//! reversible only with the passphrase *and* the `.encfs6.xml` metadata a
//! fresh mount writes into the repository root; the metadata is therefore
//! stashed per repository under the per-user data dir.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::exec::ToolCommand;
use crate::{mounts, util};

const METADATA_FILENAME: &str = ".encfs6.xml";

/// A live reverse mount. Dropping the guard unmounts best-effort;
/// [`tear_down`](Self::tear_down) unmounts with error reporting.
#[derive(Debug)]
pub struct ReverseMount {
    point: PathBuf,
    released: bool,
}

impl ReverseMount {
    /// Mount an encrypted view of `source` at `point`, which must be empty
    /// and not already mounted.
    pub async fn establish(source: &Path, point: &Path, passphrase: &str) -> Result<Self> {
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
        ToolCommand::new("encfs")
            .arg("-S")
            .arg("--standard")
            .arg("--reverse")
            .arg(source)
            .arg(point)
            .stdin(format!("{passphrase}\n"))
            .run()
            .await?;
        info!(point = %point.display(), "reverse transform mounted");
        Ok(Self {
            point: point.to_path_buf(),
            released: false,
        })
    }

    /// Unmount explicitly, surfacing the failure if there is one.
    pub async fn tear_down(mut self) -> Result<()> {
        self.released = true;
        mounts::unmount(&self.point).await
    }
}

impl Drop for ReverseMount {
    fn drop(&mut self) {
        if !self.released {
            mounts::unmount_blocking(&self.point);
        }
    }
}

/// Mount the decrypted view of `encrypted` at `target`, using previously
/// stashed metadata. The view stays mounted for the operator to copy out.
pub async fn mount_decrypted(
    encrypted: &Path,
    target: &Path,
    metadata: &Path,
    passphrase: &str,
) -> Result<()> {
    ToolCommand::new("encfs")
        .arg("-S")
        .arg(encrypted)
        .arg(target)
        .env("ENCFS6_CONFIG", metadata)
        .stdin(format!("{passphrase}\n"))
        .run()
        .await?;
    info!(target = %target.display(), "decrypted view mounted");
    Ok(())
}

/// Copy the metadata a reverse mount wrote into `repository_path` to its
/// per-repository stash location.
pub fn stash_metadata(repository_path: &Path, stash: &Path) -> Result<()> {
    if let Some(parent) = stash.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(repository_path.join(METADATA_FILENAME), stash)?;
    debug!(stash = %stash.display(), "transform metadata stashed");
    Ok(())
}

/// The stashed metadata for `repository`; its absence makes a cloud copy
/// unrecoverable.
pub fn stored_metadata(stash: &Path, repository: &str) -> Result<PathBuf> {
    if stash.is_file() {
        Ok(stash.to_path_buf())
    } else {
        Err(Error::TransformMetadataMissing {
            repository: repository.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn establish_refuses_an_occupied_mount_point() {
        let dir = tempfile::tempdir().unwrap();
        let point = dir.path().join("scratch");
        fs::create_dir(&point).unwrap();
        fs::write(point.join("leftover"), b"x").unwrap();

        let err = ReverseMount::establish(dir.path(), &point, "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DirectoryNotEmpty { .. }));
    }

    #[test]
    fn metadata_round_trips_through_the_stash() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir(&repo).unwrap();
        fs::write(repo.join(METADATA_FILENAME), b"<cfg/>").unwrap();

        let stash = dir.path().join("data/encfs/docs.xml");
        stash_metadata(&repo, &stash).unwrap();
        assert_eq!(fs::read(&stash).unwrap(), b"<cfg/>");
        assert_eq!(stored_metadata(&stash, "docs").unwrap(), stash);
    }

    #[test]
    fn missing_metadata_is_fatal_for_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let err = stored_metadata(&dir.path().join("docs.xml"), "docs").unwrap_err();
        assert!(matches!(
            err,
            Error::TransformMetadataMissing { repository } if repository == "docs"
        ));
    }
}
