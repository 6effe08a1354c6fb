//! This module defines the `run` subcommand.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use pack::registry::Filter;
use pack::PackageRecord;

use super::Workspace;
use crate::fatal;

//================================================================================================
// Types
//================================================================================================

/// The `run` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Run Options")]
pub struct Args {
    /// Run the command only in this package's directory.
    #[clap(long)]
    pkg: Option<String>,

    /// The command and its arguments.
    #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

//================================================================================================
// Functions
//================================================================================================

/// Executes a command in one or every installed package directory.
pub async fn run(args: Args) -> Result<ExitCode> {
    let ws = Workspace::open();

    let targets: Vec<&PackageRecord> = match &args.pkg {
        Some(name) => match ws.registry.record(name) {
            Some(record) => vec![record],
            None => {
                fatal!(format!("unknown package: {name}"));
                return Ok(ExitCode::FAILURE);
            }
        },
        None => ws.registry.each(Filter::InstalledEnabled).collect(),
    };

    let (program, rest) = args
        .command
        .split_first()
        .expect("clap enforces a non-empty command");

    let mut failures = 0usize;
    for record in targets {
        if !record.path.is_dir() {
            tracing::warn!(package = %record.name, "working tree missing, skipping");
            continue;
        }
        let status = tokio::process::Command::new(program)
            .args(rest)
            .current_dir(&record.path)
            .env("PKG_DIR", &record.path)
            .env("PKG_NAME", record.name.as_str())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => {
                tracing::debug!(package = %record.name, "command succeeded");
            }
            Ok(status) => {
                tracing::error!(package = %record.name, %status, "command failed");
                failures += 1;
            }
            Err(e) => {
                tracing::error!(package = %record.name, error = %e, "command could not run");
                failures += 1;
            }
        }
    }

    Ok(ws.exit(failures))
}
