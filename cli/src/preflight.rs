//! Checks that the external binaries a run will shell out to are on PATH
//! before any repository is touched, so a missing tool surfaces as one
//! aggregate error instead of a failure halfway through the pipeline.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Result, bail};
use loft_core::{RemoteKind, Repository};

use crate::Cli;

/// Work out which binaries the requested operations need, for the
/// selected repositories only.
pub fn required_tools(cli: &Cli, selected: &[&Repository]) -> BTreeSet<&'static str> {
    let mut tools = BTreeSet::new();
    if selected.is_empty() {
        return tools;
    }

    if cli.wants_engine_ops() {
        for repository in selected {
            tools.insert(repository.backend_kind().binary());
        }
    }
    if cli.fuse.is_some() {
        tools.insert("fusermount");
    }
    for repository in selected {
        for target in crate::sync_targets(&cli.sync, repository) {
            insert_transport(&mut tools, repository, &target);
        }
        if let Some(pair) = &cli.recover {
            insert_transport(&mut tools, repository, &pair[0]);
        }
    }
    tools
}

fn insert_transport(tools: &mut BTreeSet<&'static str>, repository: &Repository, target: &str) {
    if Path::new(target).is_absolute() {
        tools.insert("rsync");
        return;
    }
    match repository.remotes().iter().find(|remote| remote.name == target) {
        Some(remote) if remote.kind == RemoteKind::Cloud => {
            tools.insert("rclone");
            tools.insert("encfs");
        }
        Some(remote) if remote.is_known() => {
            tools.insert("rsync");
        }
        // Unknown or undeclared: the sync itself reports what is wrong.
        _ => {}
    }
}

pub fn ensure_tools(cli: &Cli, selected: &[&Repository]) -> Result<()> {
    let missing: Vec<_> = required_tools(cli, selected)
        .into_iter()
        .filter(|tool| which::which(tool).is_err())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        bail!("missing required tools: {}", missing.join(", "));
    }
}
