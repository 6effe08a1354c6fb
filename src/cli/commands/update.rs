//! This module defines the `update` subcommand.
//!
//! Updates fan out through the same keyed pool the installer uses, one
//! task per package, and results drain in load order. A package whose
//! working tree moved re-runs its build snippet.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use pack::git::{Git, GitError, Updated};
use pack::pool::Pool;
use pack::registry::Filter;
use pack::{resolve, Name, PackageRecord};

use super::Workspace;
use crate::fatal;

//================================================================================================
// Types
//================================================================================================

/// The `update` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Update Options")]
pub struct Args {
    /// Update only this package.
    name: Option<String>,
}

//================================================================================================
// Functions
//================================================================================================

/// Runs the update batch.
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

    let git = Git::new();
    let mut pool: Pool<Result<Updated, GitError>> = Pool::new();
    let mut names: Vec<Name> = Vec::new();

    for record in ws.registry.each(Filter::InstalledEnabled) {
        if let Some(target) = &args.name {
            if record.name.as_str() != target {
                continue;
            }
        }
        if record.update_url().is_none() {
            continue;
        }
        let git = git.clone();
        let dir = record.path.clone();
        let r#ref = record.r#ref.clone();
        names.push(record.name.clone());
        pool.defer(record.name.clone(), async move {
            git.update(&dir, &r#ref).await
        });
    }

    let mut changed = 0usize;
    let mut failures = 0usize;
    for name in &names {
        let Some(ticket) = pool.drain(name) else {
            continue;
        };
        match ticket.join().await {
            Ok(Ok(updated)) if updated.changed() => {
                tracing::info!(package = %name, old = %&updated.old[..10], new = %&updated.new[..10], "updated");
                changed += 1;
                if let Some(record) = ws.registry.record(name) {
                    if let Err(detail) = rebuild(record).await {
                        tracing::error!(package = %name, error = %detail, "build failed");
                        failures += 1;
                    }
                }
            }
            Ok(Ok(_)) => tracing::debug!(package = %name, "already up to date"),
            Ok(Err(e)) => {
                tracing::error!(package = %name, error = %e, "update failed");
                failures += 1;
            }
            Err(e) => {
                tracing::error!(package = %name, error = %e, "update task died");
                failures += 1;
            }
        }
    }

    tracing::info!(total = names.len(), changed, failures, "update complete");
    Ok(ws.exit(failures))
}

/// Re-runs a package's build snippet after its tree moved.
async fn rebuild(record: &PackageRecord) -> Result<(), String> {
    let Some(build) = &record.build else {
        return Ok(());
    };
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(build)
        .current_dir(&record.path)
        .env("PKG_DIR", &record.path)
        .env("PKG_NAME", record.name.as_str())
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_owned())
    }
}
