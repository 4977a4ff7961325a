//! YAML configuration: one document mapping repository names to their
//! engine, storage parent, sources and declared remotes.
//!
//! ```yaml
//! documents:
//!   backend: bup
//!   repository_path: /data/backups
//!   passphrase: hunter2
//!   sources:
//!     docs:
//!       dir: /home/u/Documents
//!       excluded: [tmp, bak]
//!   remotes:
//!     - bdisk
//!     - gdrive
//! ```
//!
//! The repository itself lives at `<repository_path>/loft_<name>`, so one
//! parent directory can host several repositories side by side.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use tracing::debug;

use loft_core::{BackendKind, DataPaths, EnvironmentProbe, Remote, Repository, Source};

#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    repositories: BTreeMap<String, RepositoryConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryConfig {
    backend: BackendKind,
    repository_path: PathBuf,
    #[serde(default)]
    temp_dir: Option<PathBuf>,
    #[serde(default)]
    rclone_config: Option<PathBuf>,
    #[serde(default)]
    passphrase: Option<String>,
    sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    remotes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    dir: PathBuf,
    #[serde(default)]
    excluded: Vec<String>,
}

/// Which parts of the current invocation can need a repository passphrase.
///
/// Prompting is scoped by it: a repository missing a passphrase in the
/// file is only asked for when the run selects that repository and the
/// requested operations actually use a secret (the snapshot engine, or a
/// sync/recovery touching a cloud remote). A scheduled bup backup never
/// blocks on a prompt for an unrelated config entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretDemand<'a> {
    pub engine_ops: bool,
    pub sync_targets: &'a [String],
    pub recover_target: Option<&'a str>,
    pub names: &'a [String],
}

impl SecretDemand<'_> {
    fn selects(&self, name: &str) -> bool {
        self.names.is_empty() || self.names.iter().any(|n| n == "all" || n == name)
    }

    fn needs_secret(&self, name: &str, kind: BackendKind, remotes: &[Remote]) -> bool {
        if !self.engine_ops || !self.selects(name) {
            return false;
        }
        if kind == BackendKind::Restic {
            return true;
        }
        let hits_cloud =
            |target: &str| remotes.iter().any(|r| r.name == target && r.is_cloud());
        self.sync_targets.iter().any(|target| {
            if target == "all" {
                remotes.iter().any(Remote::is_cloud)
            } else {
                hits_cloud(target)
            }
        }) || self.recover_target.is_some_and(hits_cloud)
    }
}

/// Default per-user config location, e.g. `~/.config/loft/loft.yaml`.
pub fn default_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "loft").context("per-user config directory unavailable")?;
    Ok(dirs.config_dir().join("loft.yaml"))
}

pub fn load(path: &Path) -> Result<Settings> {
    debug!(path = %path.display(), "loading configuration");
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let settings: Settings = serde_yaml::from_str(&text)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    if settings.repositories.is_empty() {
        bail!("config file {} declares no repositories", path.display());
    }
    Ok(settings)
}

impl Settings {
    /// Construct every configured repository. A passphrase missing from
    /// the file is prompted for, but only where `demand` says this run
    /// will use one.
    pub fn build_repositories(
        &self,
        data_paths: &DataPaths,
        demand: &SecretDemand<'_>,
    ) -> Result<Vec<Repository>> {
        let mut repositories = Vec::with_capacity(self.repositories.len());
        for (name, config) in &self.repositories {
            repositories.push(config.build(name, data_paths, demand)?);
        }
        Ok(repositories)
    }
}

impl RepositoryConfig {
    fn build(
        &self,
        name: &str,
        data_paths: &DataPaths,
        demand: &SecretDemand<'_>,
    ) -> Result<Repository> {
        let storage = self.repository_path.join(format!("loft_{name}"));
        let temp_dir = match &self.temp_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join(format!("loft_{name}")),
        };
        let transport_config = match &self.rclone_config {
            Some(path) => path.clone(),
            None => default_rclone_config()?,
        };
        let probe = EnvironmentProbe::gather(&transport_config);
        let remotes: Vec<Remote> = self
            .remotes
            .iter()
            .map(|remote_name| Remote::classify(remote_name, &probe))
            .collect();
        let passphrase = match &self.passphrase {
            Some(secret) => secret.clone(),
            None if demand.needs_secret(name, self.backend, &remotes) => {
                rpassword::prompt_password(format!("Passphrase for repository {name}: "))
                    .context("could not read passphrase")?
            }
            None => String::new(),
        };

        let mut repository = Repository::new(
            name,
            self.backend,
            storage,
            temp_dir,
            &transport_config,
            passphrase,
            data_paths.clone(),
        );
        for (source_name, source) in &self.sources {
            repository.add_source(Source::new(
                source_name,
                source.dir.clone(),
                source.excluded.clone(),
            ));
        }
        for remote in remotes {
            repository.add_remote(remote);
        }
        Ok(repository)
    }
}

fn default_rclone_config() -> Result<PathBuf> {
    let dirs = BaseDirs::new().context("home directory unavailable")?;
    Ok(dirs.config_dir().join("rclone/rclone.conf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loft_core::RemoteKind;

    const SAMPLE: &str = r#"
documents:
  backend: bup
  repository_path: /data/backups
  passphrase: hunter2
  sources:
    docs:
      dir: /home/u/Documents
      excluded: [tmp, bak]
    mail:
      dir: /home/u/Mail
  remotes:
    - bdisk
    - /mnt/mirror
"#;

    fn write_sample(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("loft.yaml");
        fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn sample_config_builds_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load(&write_sample(&dir)).unwrap();
        let data_paths = DataPaths::with_base(dir.path().join("state"));

        let repositories = settings
            .build_repositories(&data_paths, &SecretDemand::default())
            .unwrap();
        assert_eq!(repositories.len(), 1);

        let repository = &repositories[0];
        assert_eq!(repository.name(), "documents");
        assert_eq!(repository.backend_kind(), BackendKind::Bup);
        assert_eq!(
            repository.repository_path(),
            Path::new("/data/backups/loft_documents")
        );
        assert_eq!(repository.sources().len(), 2);
        assert_eq!(repository.sources()[0].excluded_extensions, vec!["tmp", "bak"]);

        // An absolute path classifies by itself; a bare name needs a
        // mounted disk or transport section behind it.
        let kinds: Vec<_> = repository.remotes().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RemoteKind::Unknown, RemoteKind::Directory]);
    }

    #[test]
    fn passphrases_are_not_demanded_for_unselected_repositories() {
        // A second repository without a passphrase must not trigger a
        // prompt when the run only selects the first one.
        let two = r#"
documents:
  backend: bup
  repository_path: /data/backups
  passphrase: hunter2
  sources:
    docs:
      dir: /home/u/Documents
photos:
  backend: restic
  repository_path: /data/backups
  sources:
    pics:
      dir: /home/u/Pictures
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loft.yaml");
        fs::write(&path, two).unwrap();
        let settings = load(&path).unwrap();
        let data_paths = DataPaths::with_base(dir.path().join("state"));

        let names = vec!["documents".to_string()];
        let demand = SecretDemand {
            engine_ops: true,
            names: &names,
            ..SecretDemand::default()
        };
        let repositories = settings.build_repositories(&data_paths, &demand).unwrap();
        assert_eq!(repositories.len(), 2);
    }

    #[test]
    fn secret_demand_tracks_engine_and_cloud_needs() {
        let remotes = vec![
            Remote {
                name: "gdrive".to_string(),
                kind: RemoteKind::Cloud,
                full_path: None,
            },
            Remote {
                name: "bdisk".to_string(),
                kind: RemoteKind::Disk,
                full_path: Some("/run/media/u/bdisk".into()),
            },
        ];
        let sync_cloud = vec!["gdrive".to_string()];
        let sync_disk = vec!["bdisk".to_string()];
        let sync_all = vec!["all".to_string()];

        let demand = |sync_targets: &'static [String]| SecretDemand {
            engine_ops: true,
            sync_targets,
            ..SecretDemand::default()
        };

        // The snapshot engine always needs its passphrase.
        assert!(demand(&[]).needs_secret("docs", BackendKind::Restic, &remotes));
        // bup alone does not.
        assert!(!demand(&[]).needs_secret("docs", BackendKind::Bup, &remotes));

        let cloud = SecretDemand {
            engine_ops: true,
            sync_targets: &sync_cloud,
            ..SecretDemand::default()
        };
        let disk = SecretDemand {
            engine_ops: true,
            sync_targets: &sync_disk,
            ..SecretDemand::default()
        };
        let all = SecretDemand {
            engine_ops: true,
            sync_targets: &sync_all,
            ..SecretDemand::default()
        };
        assert!(cloud.needs_secret("docs", BackendKind::Bup, &remotes));
        assert!(!disk.needs_secret("docs", BackendKind::Bup, &remotes));
        assert!(all.needs_secret("docs", BackendKind::Bup, &remotes));

        // Cloud recovery stages through the transform too.
        let recover = SecretDemand {
            engine_ops: true,
            recover_target: Some("gdrive"),
            ..SecretDemand::default()
        };
        assert!(recover.needs_secret("docs", BackendKind::Bup, &remotes));

        // Nothing is needed without engine operations or for a
        // repository the run does not select.
        assert!(!SecretDemand::default().needs_secret("docs", BackendKind::Restic, &remotes));
        let names = vec!["music".to_string()];
        let other = SecretDemand {
            engine_ops: true,
            names: &names,
            ..SecretDemand::default()
        };
        assert!(!other.needs_secret("docs", BackendKind::Restic, &remotes));
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loft.yaml");
        fs::write(
            &path,
            "documents:\n  backend: attic\n  repository_path: /data\n  sources: {}\n",
        )
        .unwrap();

        let err = load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("attic"), "{err:#}");
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = load(Path::new("/nonexistent/loft.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/loft.yaml"));
    }

    #[test]
    fn empty_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loft.yaml");
        fs::write(&path, "{}\n").unwrap();

        let err = load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("declares no repositories"));
    }
}
