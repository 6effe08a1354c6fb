//! This module defines the `doctor` subcommand.
//!
//! Doctor is purely diagnostic: it inspects the git client, the managed
//! directories, the configuration layers, and the lockfile, and prints
//! one line per check. Only a missing git client is treated as fatal.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use pack::git::Git;
use pack::lock::Lockfile;
use pack::registry::Filter;

use super::Workspace;

//================================================================================================
// Types
//================================================================================================

/// The `doctor` subcommand.
#[derive(Parser, Debug)]
pub struct Args {}

//================================================================================================
// Functions
//================================================================================================

/// Diagnoses the environment.
pub async fn run(_args: Args) -> Result<ExitCode> {
    let ws = Workspace::open();
    let mut fatal = false;

    match Git::new().version().await {
        Ok(version) => println!("ok    {version}"),
        Err(e) => {
            println!("FAIL  git client unavailable: {e}");
            fatal = true;
        }
    }

    for (label, dir) in [
        ("packages dir", ws.config.packages_dir()),
        ("state dir", ws.config.state_dir()),
        ("config dir", ws.config.paths.config.clone()),
    ] {
        if dir.is_dir() {
            println!("ok    {label}: {}", dir.display());
        } else {
            println!("note  {label} does not exist yet: {}", dir.display());
        }
    }

    if ws.report.errors == 0 {
        println!("ok    configuration: {} declaration(s)", ws.report.declared);
    } else {
        println!(
            "warn  configuration: {} declaration(s), {} rejected",
            ws.report.declared, ws.report.errors
        );
    }

    match Lockfile::load(&ws.config.lock_path()) {
        Ok(lockfile) => println!("ok    lockfile: {} pinned package(s)", lockfile.len()),
        Err(e) => println!("warn  lockfile: {e}"),
    }

    let mut missing = 0usize;
    for record in ws.registry.each(Filter::Enabled) {
        if !record.installed() {
            println!("note  {} is not installed", record.name);
            missing += 1;
        }
    }
    if missing > 0 {
        println!("note  run `sheaf install` to fetch {missing} missing package(s)");
    }

    Ok(if fatal {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
