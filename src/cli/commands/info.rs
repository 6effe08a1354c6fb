//! This module defines the `info` subcommand.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use pack::lock::Lockfile;

use super::Workspace;
use crate::fatal;

//================================================================================================
// Types
//================================================================================================

/// The `info` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Info Options")]
pub struct Args {
    /// The package to describe.
    name: String,
}

//================================================================================================
// Functions
//================================================================================================

/// Prints everything declared about one package.
pub fn run(args: Args) -> Result<ExitCode> {
    let ws = Workspace::open();

    let Some((record, config)) = ws.registry.lookup(&args.name) else {
        fatal!(format!("unknown package: {}", args.name));
        return Ok(ExitCode::FAILURE);
    };

    println!("name:      {}", record.name);
    println!("source:    {}", record.source);
    println!("path:      {}", record.path.display());
    println!("ref:       {}", record.r#ref);
    println!("local:     {}", record.local);
    println!("load:      {}", record.load_mode);
    println!("disabled:  {}", record.disabled);
    println!("installed: {}", record.installed());
    if let Some(url) = &record.url_override {
        println!("url:       {url}");
    }
    if let Some(entry) = &record.entry_override {
        println!("entry:     {entry}");
    }
    if let Some(build) = &record.build {
        println!("build:     {build}");
    }

    for (label, values) in [
        ("depends", &config.depends),
        ("env", &config.env),
        ("path", &config.paths),
        ("fpath", &config.fpaths),
        ("alias", &config.aliases),
    ] {
        if !values.is_empty() {
            println!("{label}:    {}", values.join(" "));
        }
    }
    if let Some(rc) = &config.rc {
        println!("rc:        {}", rc.trim_end());
    }

    if let Ok(lockfile) = Lockfile::load(&ws.config.lock_path()) {
        if let Some(state) = lockfile.get(&args.name) {
            println!("pinned:    {} ({})", state.commit, state.timestamp);
        }
    }

    Ok(ExitCode::SUCCESS)
}
