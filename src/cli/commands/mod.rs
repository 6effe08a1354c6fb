//! This module defines the subcommands for the sheaf CLI.
//!
//! Each subcommand is implemented in its own module and is responsible
//! for its own arguments and logic. The `run` function dispatches to the
//! appropriate subcommand and maps its outcome onto the process exit
//! code: 0 for success, 1 for user or logic errors (invalid declarations,
//! cycles, unknown packages), 2 when at least one package hit an I/O or
//! VCS failure.

use std::process::ExitCode;

use clap::Subcommand;
use pack::hooks::Hooks;
use pack::ingest::{self, IngestReport};
use pack::registry::Registry;

use super::Args;
use crate::fatal;

mod diff;
mod doctor;
mod freeze;
mod info;
mod install;
mod list;
mod path;
mod remove;
mod restore;
mod run;
mod self_update;
mod update;

//================================================================================================
// Types
//================================================================================================

/// The subcommands for the sheaf CLI.
#[derive(Subcommand)]
pub(super) enum Commands {
    /// Install declared packages and emit the session script.
    ///
    /// Resolves the declared dependency graph, clones anything missing
    /// (concurrently), and prints an eval-able script of every package's
    /// session effects to stdout. With a name, only that package and its
    /// dependencies are processed.
    Install(install::Args),
    /// Bring installed packages up to date with their remotes.
    ///
    /// Commit-pinned packages never move; tag pins are re-fetched; branch
    /// and default checkouts fast-forward. Build snippets re-run for
    /// packages that changed.
    Update(update::Args),
    /// Delete a package's working tree and forget it.
    ///
    /// Only remote working trees under the managed packages directory are
    /// deleted; a local tree is user property and is left alone.
    Remove(remove::Args),
    /// List declared packages and their state.
    List(list::Args),
    /// Pin every installed revision into the lockfile.
    Freeze(freeze::Args),
    /// Reinstall every package at its lockfile revision.
    Restore(restore::Args),
    /// Show everything declared about one package.
    Info(info::Args),
    /// Compare the lockfile against the working trees on disk.
    Diff(diff::Args),
    /// Diagnose the environment: git, directories, configuration, lockfile.
    Doctor(doctor::Args),
    /// Print a package's on-disk path.
    Path(path::Args),
    /// Run a command inside one or every installed package directory.
    Run(run::Args),
    /// Update the sheaf installation itself, when it lives in a git tree.
    SelfUpdate(self_update::Args),
    /// Print version information.
    Version,
}

/// Shared command state: configuration plus the fully ingested registry.
pub(crate) struct Workspace {
    /// The application configuration.
    pub config: &'static config::Config,
    /// The registry populated from all three configuration layers.
    pub registry: Registry,
    /// The lifecycle hook bus.
    pub hooks: Hooks,
    /// Declaration counters from ingestion.
    pub report: IngestReport,
}

//================================================================================================
// Impls
//================================================================================================

impl Workspace {
    /// Loads configuration and runs every ingestion layer.
    pub(crate) fn open() -> Self {
        let config = &*config::CONFIG;
        let mut registry = Registry::new(config.packages_dir());
        let hooks = Hooks::new();
        let report = ingest::ingest_all(config, &mut registry, &hooks);
        Workspace {
            config,
            registry,
            hooks,
            report,
        }
    }

    /// Folds the ingestion outcome into a command's exit code: VCS
    /// failures dominate, then declaration errors.
    pub(crate) fn exit(&self, vcs_failures: usize) -> ExitCode {
        if vcs_failures > 0 {
            ExitCode::from(2)
        } else if self.report.errors > 0 {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

//================================================================================================
// Functions
//================================================================================================

/// The main entry point for the sheaf CLI.
pub async fn run(args: Args) -> ExitCode {
    let result = match args.command {
        Commands::Install(args) => install::run(args).await,
        Commands::Update(args) => update::run(args).await,
        Commands::Remove(args) => remove::run(args),
        Commands::List(args) => list::run(args),
        Commands::Freeze(args) => freeze::run(args).await,
        Commands::Restore(args) => restore::run(args).await,
        Commands::Info(args) => info::run(args),
        Commands::Diff(args) => diff::run(args).await,
        Commands::Doctor(args) => doctor::run(args).await,
        Commands::Path(args) => path::run(args),
        Commands::Run(args) => run::run(args).await,
        Commands::SelfUpdate(args) => self_update::run(args).await,
        Commands::Version => {
            println!("sheaf {}", clap::crate_version!());
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            fatal!(e);
            ExitCode::FAILURE
        }
    }
}
