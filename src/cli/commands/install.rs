//! This module defines the `install` subcommand.
//!
//! Install drives the full pipeline: ingest, resolve, the two-pass
//! install/load run. The resulting session script goes to stdout so the
//! caller's shell can pick the effects up with `eval "$(sheaf install)"`.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use pack::loader::Loader;
use pack::resolve;
use pack::session::ScriptSession;

use super::Workspace;
use crate::fatal;

//================================================================================================
// Types
//================================================================================================

/// The `install` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Install Options")]
pub struct Args {
    /// Restrict the pipeline to this package and its dependencies.
    name: Option<String>,
}

//================================================================================================
// Functions
//================================================================================================

/// Runs the install pipeline.
pub async fn run(args: Args) -> Result<ExitCode> {
    let mut ws = Workspace::open();

    if let Some(name) = &args.name {
        if ws.registry.lookup(name).is_none() {
            fatal!(format!("unknown package: {name}"));
            return Ok(ExitCode::FAILURE);
        }
    }

    if let Err(e) = resolve::resolve(&mut ws.registry, &ws.hooks) {
        fatal!(e);
        return Ok(ExitCode::FAILURE);
    }

    let mut session = ScriptSession::new();
    let report = Loader::new(
        &ws.registry,
        &ws.hooks,
        &mut session,
        ws.config.shell.suffix.clone(),
    )
    .run(args.name.as_deref())
    .await;

    tracing::info!(
        loaded = report.loaded,
        installed = report.installed,
        failures = report.failures,
        "pipeline complete"
    );

    // The session script is the command's stdout product.
    print!("{}", session.render());

    Ok(ws.exit(report.failures))
}
