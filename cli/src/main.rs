mod commands;
mod config;
mod preflight;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use loft_core::{DataPaths, Repository, SyncStateStore};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "loft",
    about = "Backs up named folders into versioned repositories and syncs those to disks, directories and cloud remotes"
)]
struct Cli {
    /// Repository names to operate on, or "all".
    #[arg(value_name = "NAME")]
    names: Vec<String>,

    #[arg(short, long, help = "Save every selected repository")]
    backup: bool,

    #[arg(
        short,
        long,
        help = "Verify repository integrity and repair from redundancy data"
    )]
    check: bool,

    #[arg(
        short,
        long,
        value_name = "REMOTE",
        value_delimiter = ',',
        help = "Sync to these remotes (comma-separated, or \"all\" for every declared one)"
    )]
    sync: Vec<String>,

    #[arg(
        short,
        long,
        value_name = "DIR",
        help = "Mount the repository at DIR for browsing; run again to unmount"
    )]
    fuse: Option<PathBuf>,

    #[arg(short, long, value_name = "DIR", help = "Restore every source into DIR")]
    restore: Option<PathBuf>,

    #[arg(
        long,
        num_args = 2,
        value_names = ["REMOTE", "DIR"],
        action = clap::ArgAction::Set,
        help = "Recover the repository copy held by REMOTE (name or path) into DIR"
    )]
    recover: Option<Vec<String>>,

    #[arg(short, long, help = "Describe the configured repositories")]
    list: bool,

    #[arg(long, help = "Show when each repository last synced to each remote")]
    last_synced: bool,

    #[arg(
        long,
        env = "LOFT_CONFIG",
        value_name = "FILE",
        help = "Configuration file path"
    )]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode")]
    quiet: bool,
}

impl Cli {
    /// Operations that will shell out to an engine or transport.
    fn wants_engine_ops(&self) -> bool {
        self.backup
            || self.check
            || !self.sync.is_empty()
            || self.fuse.is_some()
            || self.restore.is_some()
            || self.recover.is_some()
    }

    fn selects(&self, name: &str) -> bool {
        self.names.is_empty() || self.names.iter().any(|n| n == "all" || n == name)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    let started = Instant::now();

    // Ctrl-C aborts the pipeline mid-flight; scoped mount guards release
    // on the way out.
    let result = tokio::select! {
        result = run(&cli) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow!(
            "interrupted after {:.2}s",
            started.elapsed().as_secs_f64()
        )),
    };

    match result {
        Ok(0) => {
            if cli.wants_engine_ops() {
                println!(
                    "✅ Everything done in {:.2}s.",
                    started.elapsed().as_secs_f64()
                );
            }
            Ok(())
        }
        Ok(failures) => bail!("{failures} operation(s) failed"),
        Err(err) => Err(err),
    }
}

async fn run(cli: &Cli) -> Result<usize> {
    if !cli.wants_engine_ops() && !cli.list && !cli.last_synced {
        bail!("nothing to do; try --help");
    }
    if cli.wants_engine_ops() && cli.names.is_empty() {
        bail!("repository names required (or \"all\")");
    }
    let single_repository_ops =
        cli.fuse.is_some() || cli.restore.is_some() || cli.recover.is_some();
    if single_repository_ops && (cli.names.len() != 1 || cli.names[0] == "all") {
        bail!("mount, restore and recover operate on exactly one repository");
    }

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_path()?,
    };
    let settings = config::load(&config_path)?;
    let data_paths = DataPaths::discover()?;
    data_paths.ensure_layout()?;
    let store = SyncStateStore::new(data_paths.sync_state_file());

    let demand = config::SecretDemand {
        engine_ops: cli.wants_engine_ops(),
        sync_targets: &cli.sync,
        recover_target: cli.recover.as_deref().map(|pair| pair[0].as_str()),
        names: &cli.names,
    };
    let mut repositories = settings.build_repositories(&data_paths, &demand)?;
    for name in &cli.names {
        if name != "all" && !repositories.iter().any(|r| r.name() == name) {
            bail!("no repository named {name} in {}", config_path.display());
        }
    }
    {
        let selected: Vec<&Repository> = repositories
            .iter()
            .filter(|r| cli.selects(r.name()))
            .collect();
        preflight::ensure_tools(cli, &selected)?;
    }
    info!("Starting loft");

    let mut failures = 0;
    for repository in repositories.iter_mut() {
        if !cli.selects(repository.name()) {
            continue;
        }

        if cli.list {
            println!("{repository}\n");
        }
        if cli.check && !cli.backup {
            if let Err(err) = commands::check::run(repository).await {
                eprintln!("❌ {}: check failed: {err:#}", repository.name());
                failures += 1;
            }
        }
        if cli.backup {
            // --check alongside --backup folds the integrity pass into
            // the save pipeline instead of running it twice.
            if let Err(err) = commands::backup::run(repository, cli.check).await {
                eprintln!("❌ {}: backup failed: {err:#}", repository.name());
                failures += 1;
            }
        }
        for target in sync_targets(&cli.sync, repository) {
            if let Err(err) = commands::sync::run(repository, &target).await {
                eprintln!(
                    "❌ {}: sync to {target} failed: {err:#}",
                    repository.name()
                );
                failures += 1;
            }
        }
        if let Some(point) = &cli.fuse {
            if let Err(err) = commands::mount::toggle(repository, point).await {
                eprintln!("❌ {}: mount failed: {err:#}", repository.name());
                failures += 1;
            }
        }
        if let Some(target) = &cli.restore {
            if let Err(err) = commands::restore::run(repository, target).await {
                eprintln!("❌ {}: restore failed: {err:#}", repository.name());
                failures += 1;
            }
        }
        if let Some(pair) = &cli.recover {
            let (remote, target) = (&pair[0], Path::new(&pair[1]));
            if let Err(err) = commands::recover::run(repository, remote, target).await {
                eprintln!("❌ {}: recovery failed: {err:#}", repository.name());
                failures += 1;
            }
        }
    }

    if !cli.sync.is_empty() {
        store
            .export(repositories.iter().map(|r| (r.name(), r.just_synced())))
            .context("could not persist sync state")?;
    }
    if cli.last_synced {
        commands::last_synced::run(&store)?;
    }
    Ok(failures)
}

/// "all" expands to every remote the repository declares.
fn sync_targets(requested: &[String], repository: &Repository) -> Vec<String> {
    if requested.iter().any(|target| target == "all") {
        repository
            .remotes()
            .iter()
            .map(|remote| remote.name.clone())
            .collect()
    } else {
        requested.to_vec()
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("loft={level},loft_core={level}")));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Setting default subscriber failed");
}
