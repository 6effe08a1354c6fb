//! This module defines the `freeze` subcommand.

use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use pack::git::Git;
use pack::lock;

use super::Workspace;

//================================================================================================
// Types
//================================================================================================

/// The `freeze` subcommand.
#[derive(Parser, Debug)]
pub struct Args {}

//================================================================================================
// Functions
//================================================================================================

/// Pins every enabled, installed, remote package into the lockfile.
pub async fn run(_args: Args) -> Result<ExitCode> {
    let ws = Workspace::open();
    let git = Git::new();

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the epoch")?
        .as_secs();

    let (lockfile, report) = lock::freeze(&ws.registry, &git, now).await;
    let path = ws.config.lock_path();
    lockfile
        .store(&path)
        .with_context(|| format!("writing {}", path.display()))?;

    tracing::info!(
        pinned = report.completed,
        failures = report.failures,
        path = %path.display(),
        "lockfile written"
    );
    Ok(ws.exit(report.failures))
}
