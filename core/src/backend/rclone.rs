use std::collections::BTreeSet;
use std::path::Path;

use crate::error::Result;
use crate::exec::{ToolCommand, ToolOutput};

/// Upload `dir` so `container` becomes an exact mirror of it.
pub async fn sync(config: &Path, dir: &Path, container: &str) -> Result<ToolOutput> {
    ToolCommand::new("rclone")
        .arg(format!("--config={}", config.display()))
        .arg("sync")
        .arg("--transfers=16")
        .arg(dir)
        .arg(container)
        .run()
        .await
}

/// Download the contents of `container` into `dir`.
pub async fn copy(config: &Path, container: &str, dir: &Path) -> Result<ToolOutput> {
    ToolCommand::new("rclone")
        .arg(format!("--config={}", config.display()))
        .arg("copy")
        .arg("--transfers=16")
        .arg(container)
        .arg(dir)
        .run()
        .await
}

/// Container address for one repository on one cloud remote.
pub fn container_for(remote: &str, repository: &str) -> String {
    format!("{remote}:{repository}")
}

/// Section names of an rclone-style config file. Sections are the set of
/// valid cloud remote identifiers; credentials are never read.
pub fn config_sections(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('[') && line.ends_with(']'))
        .map(|line| line[1..line.len() - 1].trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_header_names_only() {
        let config = "\
# comment
[gdrive]
type = drive
token = {\"access_token\":\"xyz\"}

  [hubic]
type = hubic

[]
key = [not a header]
";
        let sections = config_sections(config);
        assert_eq!(
            sections.into_iter().collect::<Vec<_>>(),
            ["gdrive", "hubic"]
        );
    }

    #[test]
    fn container_addresses_are_remote_scoped() {
        assert_eq!(container_for("gdrive", "documents"), "gdrive:documents");
    }
}
