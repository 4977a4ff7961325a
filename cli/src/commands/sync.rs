use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use loft_core::Repository;
use tracing::debug;

/// Mirror the repository to one remote, by name or by path.
pub async fn run(repository: &mut Repository, target: &str) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("Syncing {} to {target}...", repository.name()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let outcome = repository.sync_remote(target).await?;
    spinner.finish_and_clear();

    println!(
        "✅ {}: synced to {} ({}) in {:.2}s",
        repository.name(),
        outcome.remote,
        outcome.kind,
        outcome.elapsed.as_secs_f64()
    );
    if !outcome.log.is_empty() {
        debug!("{}", outcome.log);
    }
    Ok(())
}
