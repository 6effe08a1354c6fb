//! This module defines the `restore` subcommand.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pack::git::Git;
use pack::lock::{self, Lockfile};

use super::Workspace;

//================================================================================================
// Types
//================================================================================================

/// The `restore` subcommand.
#[derive(Parser, Debug)]
pub struct Args {}

//================================================================================================
// Functions
//================================================================================================

/// Reinstalls every lockfile entry at its recorded commit.
pub async fn run(_args: Args) -> Result<ExitCode> {
    let ws = Workspace::open();
    let path = ws.config.lock_path();
    let lockfile =
        Lockfile::load(&path).with_context(|| format!("reading {}", path.display()))?;

    if lockfile.is_empty() {
        tracing::warn!(path = %path.display(), "lockfile is empty; nothing to restore");
        return Ok(ws.exit(0));
    }

    let git = Git::new();
    let report = lock::restore(&lockfile, &git, &ws.config.packages_dir()).await;

    tracing::info!(
        restored = report.completed,
        failures = report.failures,
        "restore complete"
    );
    Ok(ws.exit(report.failures))
}
