use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use loft_core::Repository;
use loft_core::util::readable_size;

/// Save the repository, optionally verifying integrity first.
pub async fn run(repository: &Repository, check_before: bool) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("Backing up {}...", repository.name()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let report = repository.save(check_before).await?;
    spinner.finish_and_clear();

    let delta = report.size_delta();
    let growth = if delta >= 0 {
        format!("+{}", readable_size(delta as u64))
    } else {
        format!("-{}", readable_size(delta.unsigned_abs()))
    };
    println!(
        "✅ {}: {} entries processed in {:.2}s ({} -> {}, {})",
        repository.name(),
        report.files_processed,
        report.elapsed.as_secs_f64(),
        readable_size(report.size_before),
        readable_size(report.size_after),
        growth
    );
    Ok(())
}
