use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use loft_core::Repository;
use tracing::debug;

/// Verify repository integrity, repairing from redundancy data if the
/// engine supports it.
pub async fn run(repository: &Repository) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("Checking {}...", repository.name()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let log = repository.check_and_repair().await?;
    spinner.finish_and_clear();

    println!("✅ {}: integrity verified", repository.name());
    if !log.is_empty() {
        debug!("{log}");
    }
    Ok(())
}
