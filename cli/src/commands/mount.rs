use std::path::Path;

use anyhow::Result;
use loft_core::{Repository, mounts};

/// Mount the repository for browsing, or unmount it if the point is
/// already a live FUSE mount.
pub async fn toggle(repository: &Repository, point: &Path) -> Result<()> {
    if mounts::is_fuse_mounted(point)? {
        repository.unfuse(point).await;
        println!("✅ {}: unmounted {}", repository.name(), point.display());
    } else {
        repository.fuse(point).await?;
        println!(
            "✅ {}: mounted at {} (run the same command again to unmount)",
            repository.name(),
            point.display()
        );
    }
    Ok(())
}
