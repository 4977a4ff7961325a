use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::rclone;

/// How a sync destination is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    /// A plain directory, addressed by absolute path.
    Directory,
    /// A removable disk mounted under the user's removable-media root.
    Disk,
    /// A container configured in the sync transport.
    Cloud,
    /// Declared but currently unresolvable: disk unplugged, container
    /// never configured, or a plain typo.
    Unknown,
}

impl fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RemoteKind::Directory => "directory",
            RemoteKind::Disk => "disk",
            RemoteKind::Cloud => "cloud",
            RemoteKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Snapshot of the environment facts remote classification depends on.
///
/// Gathered once per repository construction, so classification itself is
/// a pure function that tests can feed directly.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentProbe {
    pub removable_root: PathBuf,
    pub removable_mounts: BTreeSet<String>,
    pub transport_sections: BTreeSet<String>,
}

impl EnvironmentProbe {
    /// Probe the running system: removable media mounted under
    /// `/run/media/<user>` plus the section names of `transport_config`.
    pub fn gather(transport_config: &Path) -> Self {
        Self::at_root(default_removable_root(), transport_config)
    }

    /// [`gather`](Self::gather) with an explicit removable-media root.
    pub fn at_root(removable_root: PathBuf, transport_config: &Path) -> Self {
        let removable_mounts = fs::read_dir(&removable_root)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        let transport_sections = fs::read_to_string(transport_config)
            .map(|text| rclone::config_sections(&text))
            .unwrap_or_default();
        Self {
            removable_root,
            removable_mounts,
            transport_sections,
        }
    }
}

fn default_removable_root() -> PathBuf {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_default();
    Path::new("/run/media").join(user)
}

/// One sync destination, classified once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub kind: RemoteKind,
    pub full_path: Option<PathBuf>,
}

impl Remote {
    /// Classify `name` against `probe`.
    ///
    /// Tie-break order matters: an absolute path always wins as a
    /// directory remote because a literal filesystem path is unambiguous;
    /// a mounted removable disk is checked next since it needs no
    /// configuration; a transport section last. Anything else is left
    /// unknown rather than rejected, and only fails once an operation
    /// tries to use it.
    pub fn classify(name: impl Into<String>, probe: &EnvironmentProbe) -> Self {
        let name = name.into();
        if Path::new(&name).is_absolute() {
            let full_path = Some(PathBuf::from(&name));
            return Self {
                name,
                kind: RemoteKind::Directory,
                full_path,
            };
        }
        if probe.removable_mounts.contains(&name) {
            let full_path = Some(probe.removable_root.join(&name));
            return Self {
                name,
                kind: RemoteKind::Disk,
                full_path,
            };
        }
        if probe.transport_sections.contains(&name) {
            return Self {
                name,
                kind: RemoteKind::Cloud,
                full_path: None,
            };
        }
        Self {
            name,
            kind: RemoteKind::Unknown,
            full_path: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == RemoteKind::Directory
    }

    pub fn is_disk(&self) -> bool {
        self.kind == RemoteKind::Disk
    }

    pub fn is_cloud(&self) -> bool {
        self.kind == RemoteKind::Cloud
    }

    /// Whether the remote resolved to something operations can address.
    pub fn is_known(&self) -> bool {
        self.kind != RemoteKind::Unknown
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> EnvironmentProbe {
        EnvironmentProbe {
            removable_root: PathBuf::from("/run/media/tester"),
            removable_mounts: ["bdisk".to_string()].into_iter().collect(),
            transport_sections: ["gdrive".to_string(), "bdisk".to_string()]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn absolute_path_always_wins() {
        let remote = Remote::classify("/mnt/mirror", &probe());
        assert_eq!(remote.kind, RemoteKind::Directory);
        assert_eq!(remote.full_path.as_deref(), Some(Path::new("/mnt/mirror")));
    }

    #[test]
    fn mounted_disk_beats_transport_section() {
        // "bdisk" is both plugged in and a transport section.
        let remote = Remote::classify("bdisk", &probe());
        assert_eq!(remote.kind, RemoteKind::Disk);
        assert_eq!(
            remote.full_path.as_deref(),
            Some(Path::new("/run/media/tester/bdisk"))
        );
    }

    #[test]
    fn transport_section_classifies_as_cloud() {
        let remote = Remote::classify("gdrive", &probe());
        assert_eq!(remote.kind, RemoteKind::Cloud);
        assert!(remote.full_path.is_none());
        assert!(remote.is_known());
    }

    #[test]
    fn unmatched_name_stays_unknown() {
        let remote = Remote::classify("unplugged", &probe());
        assert_eq!(remote.kind, RemoteKind::Unknown);
        assert!(!remote.is_known());
    }

    #[test]
    fn classification_is_pure_and_exclusive() {
        let probe = probe();
        for name in ["/mnt/mirror", "bdisk", "gdrive", "unplugged", ""] {
            let first = Remote::classify(name, &probe);
            let second = Remote::classify(name, &probe);
            assert_eq!(first, second);

            let kinds = [first.is_directory(), first.is_disk(), first.is_cloud()];
            let matched = kinds.iter().filter(|hit| **hit).count();
            assert!(matched <= 1, "{name} matched {matched} kinds");
            assert_eq!(matched == 0, !first.is_known());
        }
    }

    #[test]
    fn probe_tolerates_missing_environment() {
        let dir = tempfile::tempdir().unwrap();
        let probe = EnvironmentProbe::at_root(
            dir.path().join("no-such-root"),
            &dir.path().join("no-such-rclone.conf"),
        );
        assert!(probe.removable_mounts.is_empty());
        assert!(probe.transport_sections.is_empty());
    }

    #[test]
    fn probe_lists_mounted_disks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bdisk")).unwrap();
        let probe =
            EnvironmentProbe::at_root(dir.path().to_path_buf(), &dir.path().join("none.conf"));
        assert!(probe.removable_mounts.contains("bdisk"));
    }
}
