use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::exec::ToolCommand;

const MOUNT_TABLE: &str = "/proc/self/mounts";

/// One row of the kernel mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub point: PathBuf,
    pub fstype: String,
}

/// Parse the kernel mount table format: whitespace-separated fields with
/// octal escapes inside them (`\040` for a space in a mount point).
pub fn parse_mount_table(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let point = fields.next()?;
            let fstype = fields.next()?;
            Some(MountEntry {
                device: unescape_field(device),
                point: PathBuf::from(unescape_field(point)),
                fstype: fstype.to_string(),
            })
        })
        .collect()
}

fn unescape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let code: String = chars.by_ref().take(3).collect();
        match u8::from_str_radix(&code, 8) {
            Ok(byte) => out.push(byte as char),
            Err(_) => {
                out.push('\\');
                out.push_str(&code);
            }
        }
    }
    out
}

fn is_fuse_type(fstype: &str) -> bool {
    fstype == "fuse" || fstype.starts_with("fuse.")
}

/// Mount points of every fuse filesystem currently mounted (bup-fuse,
/// encfs, restic all register as `fuse` or `fuse.*`).
pub fn fuse_mounts() -> Result<Vec<PathBuf>> {
    let table = fs::read_to_string(MOUNT_TABLE)?;
    Ok(parse_mount_table(&table)
        .into_iter()
        .filter(|entry| is_fuse_type(&entry.fstype))
        .map(|entry| entry.point)
        .collect())
}

/// Whether `path` is currently a fuse mount point. A path that does not
/// exist cannot be mounted.
pub fn is_fuse_mounted(path: &Path) -> Result<bool> {
    let Ok(canonical) = fs::canonicalize(path) else {
        return Ok(false);
    };
    Ok(fuse_mounts()?.iter().any(|point| *point == canonical))
}

/// Unmount a fuse mount point.
pub async fn unmount(path: &Path) -> Result<()> {
    ToolCommand::new("fusermount")
        .arg("-u")
        .arg(path)
        .run()
        .await?;
    Ok(())
}

/// Blocking, best-effort unmount for drop paths. Failures are logged and
/// swallowed.
pub fn unmount_blocking(path: &Path) {
    let result = std::process::Command::new("fusermount")
        .arg("-u")
        .arg(path)
        .output();
    match result {
        Ok(output) if output.status.success() => {}
        Ok(output) => warn!(
            path = %path.display(),
            "fusermount -u failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(err) => warn!(path = %path.display(), "could not run fusermount: {err}"),
    }
}
