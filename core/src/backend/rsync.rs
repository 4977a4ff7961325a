use std::path::Path;

use crate::error::Result;
use crate::exec::{ToolCommand, ToolOutput};

/// Archive-mode mirror with deletions. `src` is passed without a trailing
/// slash, so it lands under `dst` as a directory named after it; both the
/// folder sync and the folder recovery lean on that.
pub async fn mirror(src: &Path, dst: &Path) -> Result<ToolOutput> {
    ToolCommand::new("rsync")
        .arg("-a")
        .arg("--delete")
        .arg("--human-readable")
        .arg("--info=progress2")
        .arg("--force")
        .arg(src)
        .arg(dst)
        .run()
        .await
}
