//! This module defines the `list` subcommand.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use pack::registry::Filter;
use pack::resolve;

use super::Workspace;

//================================================================================================
// Types
//================================================================================================

/// The `list` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "List Options")]
pub struct Args {
    /// Include disabled packages.
    #[clap(long, short)]
    all: bool,
}

//================================================================================================
// Functions
//================================================================================================

/// Prints every declared package with its state. Always exits zero.
pub fn run(args: Args) -> Result<ExitCode> {
    let mut ws = Workspace::open();

    // Best-effort ordering; a cyclic graph still lists in declaration
    // order.
    let _ = resolve::resolve(&mut ws.registry, &ws.hooks);

    let filter = if args.all { Filter::All } else { Filter::Enabled };
    for record in ws.registry.each(filter) {
        let state = if record.disabled {
            "disabled"
        } else if record.local {
            "local"
        } else if record.installed() {
            "installed"
        } else {
            "missing"
        };
        println!(
            "{:<24} {:<9} {:<8} {}",
            record.name, state, record.load_mode, record.source
        );
    }

    Ok(ExitCode::SUCCESS)
}
