use anyhow::Result;
use loft_core::SyncStateStore;

/// Print the recorded sync history, repository by repository.
pub fn run(store: &SyncStateStore) -> Result<()> {
    let state = store.load()?;
    if state.is_empty() {
        println!("No sync recorded yet.");
        return Ok(());
    }
    for (repository, remotes) in &state {
        println!("{repository}:");
        for (remote, stamp) in remotes {
            println!("  {remote}: {stamp}");
        }
    }
    Ok(())
}
