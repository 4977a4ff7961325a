use std::path::Path;

use anyhow::Result;
use loft_core::Repository;
use tracing::debug;

/// Pull the repository copy held by a remote back onto this machine.
pub async fn run(repository: &Repository, remote: &str, target: &Path) -> Result<()> {
    let log = repository.recover(remote, target).await?;

    println!(
        "✅ {}: recovered from {remote} into {}",
        repository.name(),
        target.display()
    );
    if !log.is_empty() {
        debug!("{log}");
    }
    Ok(())
}
