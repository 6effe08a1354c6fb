//! This module defines the `path` subcommand.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use super::Workspace;
use crate::fatal;

//================================================================================================
// Types
//================================================================================================

/// The `path` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Path Options")]
pub struct Args {
    /// The package whose path to print.
    name: String,
}

//================================================================================================
// Functions
//================================================================================================

/// Prints the on-disk location of a package.
pub fn run(args: Args) -> Result<ExitCode> {
    let ws = Workspace::open();

    let Some(record) = ws.registry.record(&args.name) else {
        fatal!(format!("unknown package: {}", args.name));
        return Ok(ExitCode::FAILURE);
    };

    println!("{}", record.path.display());
    Ok(ExitCode::SUCCESS)
}
