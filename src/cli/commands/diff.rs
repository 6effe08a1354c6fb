//! This module defines the `diff` subcommand.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pack::git::Git;
use pack::lock::{self, DiffState, Lockfile};

use super::Workspace;

//================================================================================================
// Types
//================================================================================================

/// The `diff` subcommand.
#[derive(Parser, Debug)]
pub struct Args {}

//================================================================================================
// Functions
//================================================================================================

/// Compares the lockfile against the working trees on disk.
pub async fn run(_args: Args) -> Result<ExitCode> {
    let ws = Workspace::open();
    let path = ws.config.lock_path();
    let lockfile =
        Lockfile::load(&path).with_context(|| format!("reading {}", path.display()))?;

    let git = Git::new();
    for (name, state) in lock::diff(&lockfile, &ws.registry, &git).await {
        match state {
            DiffState::Unchanged => println!("{name:<24} unchanged"),
            DiffState::Drifted { locked, actual } => {
                println!("{name:<24} drifted   {} -> {}", &locked[..10], &actual[..10]);
            }
            DiffState::Missing => println!("{name:<24} missing"),
            DiffState::Untracked => println!("{name:<24} untracked"),
        }
    }

    Ok(ws.exit(0))
}
