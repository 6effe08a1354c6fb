//! This module defines the `remove` subcommand.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use super::Workspace;
use crate::fatal;

//================================================================================================
// Types
//================================================================================================

/// The `remove` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Remove Options")]
pub struct Args {
    /// The package to remove.
    name: String,
}

//================================================================================================
// Functions
//================================================================================================

/// Deletes the working tree of a remote package and evicts it.
pub fn run(args: Args) -> Result<ExitCode> {
    let mut ws = Workspace::open();

    let Some(record) = ws.registry.remove(&args.name) else {
        fatal!(format!("unknown package: {}", args.name));
        return Ok(ExitCode::FAILURE);
    };

    if record.local {
        tracing::info!(package = %record.name, "local package forgotten; its tree was left in place");
        return Ok(ws.exit(0));
    }

    // Refuse to delete anything outside the managed packages directory.
    if !record.path.starts_with(ws.registry.packages_dir()) {
        fatal!(format!(
            "refusing to delete {} outside the packages directory",
            record.path.display()
        ));
        return Ok(ExitCode::FAILURE);
    }

    match std::fs::remove_dir_all(&record.path) {
        Ok(()) => {
            tracing::info!(package = %record.name, path = %record.path.display(), "removed");
            tracing::warn!(
                package = %record.name,
                "the declaration still exists in your configuration; remove it to keep the package from reinstalling"
            );
            Ok(ws.exit(0))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(package = %record.name, "nothing on disk to remove");
            Ok(ws.exit(0))
        }
        Err(e) => {
            tracing::error!(package = %record.name, error = %e, "removal failed");
            Ok(ExitCode::from(2))
        }
    }
}
