//! This module defines the `self-update` subcommand.
//!
//! When the running executable lives inside a git working tree (the
//! from-source installation layout), the tree is fast-forwarded. Package
//! state is never touched; binaries installed by other means are left to
//! their own package manager.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pack::git::Git;
use pack::package::Ref;

//================================================================================================
// Types
//================================================================================================

/// The `self-update` subcommand.
#[derive(Parser, Debug)]
pub struct Args {}

//================================================================================================
// Functions
//================================================================================================

/// Updates the sheaf installation itself.
pub async fn run(_args: Args) -> Result<ExitCode> {
    let exe = std::env::current_exe().context("cannot locate the running executable")?;
    let exe = std::fs::canonicalize(&exe).unwrap_or(exe);

    let Some(tree) = enclosing_work_tree(&exe) else {
        tracing::info!(
            exe = %exe.display(),
            "this installation is not a git working tree; update it with the tool that installed it"
        );
        return Ok(ExitCode::SUCCESS);
    };

    match Git::new().update(&tree, &Ref::None).await {
        Ok(updated) if updated.changed() => {
            tracing::info!(
                tree = %tree.display(),
                old = %&updated.old[..10],
                new = %&updated.new[..10],
                "updated; rebuild or re-source to pick up the new version"
            );
            Ok(ExitCode::SUCCESS)
        }
        Ok(_) => {
            tracing::info!("already up to date");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, "self-update failed");
            Ok(ExitCode::from(2))
        }
    }
}

/// The nearest ancestor of `path` that is a git working tree.
fn enclosing_work_tree(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}
