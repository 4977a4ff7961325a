use std::path::Path;

use anyhow::{Result, bail};
use loft_core::Repository;

/// Restore every source into its own subdirectory of `target`. Sources
/// are independent, so one failure does not stop the others.
pub async fn run(repository: &Repository, target: &Path) -> Result<()> {
    let report = repository.restore(target).await?;

    for outcome in &report.outcomes {
        if outcome.success {
            println!(
                "✅ {}: restored under {}",
                outcome.source,
                target.join(&outcome.source).display()
            );
        } else {
            eprintln!("❌ {}: {}", outcome.source, outcome.detail);
        }
    }
    if report.all_succeeded() {
        Ok(())
    } else {
        bail!("some sources could not be restored");
    }
}
