//! Argument parsing and subcommand dispatch for the sheaf CLI.

mod commands;
pub mod logging;

use std::path::PathBuf;

use clap::Parser;
pub use commands::run;
pub use logging::init_global_subscriber;

//================================================================================================
// Types
//================================================================================================

/// The top-level argument structure.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Change the current working directory
    ///
    /// If specified, changes the current working directory to the given
    /// path before executing any commands. This affects all file system
    /// operations performed by the program.
    #[arg(short = 'C', value_name = "DIR", global = true, value_parser = validate_path)]
    working_directory: Option<PathBuf>,

    /// Logging flags shared by every subcommand.
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    command: commands::Commands,
}

/// Verbosity flags shared by every subcommand.
#[derive(Parser, Clone, Copy, Debug)]
#[command(next_help_heading = "Log Options")]
pub struct LogArgs {
    /// Set the level of verbosity
    ///
    /// This flag can be used multiple times to increase verbosity:
    /// 1. -v    for DEBUG level
    /// 2. -vv   for TRACE level
    ///
    /// If not specified, defaults to INFO level. The `RUST_LOG`
    /// environment variable takes precedence over this flag.
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase logging verbosity",
    )]
    verbosity: u8,

    /// Suppress verbosity (*takes precedent*)
    ///
    /// This flag can be used multiple times to decrease verbosity:
    /// 1. -q    for WARN level
    /// 2. -qq   for ERROR level
    ///
    /// It overrides both `--verbosity` and `RUST_LOG`.
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
    )]
    quiet: u8,
}

//================================================================================================
// Functions
//================================================================================================

fn validate_path(path: &str) -> Result<PathBuf, std::io::Error> {
    std::fs::canonicalize(path)
}

/// Applies a leading `-C <dir>` before clap ever sees the arguments, so
/// the directory change affects configuration discovery too.
pub fn change_directory() -> Vec<String> {
    let mut pending = false;
    std::env::args()
        .map(|arg| {
            if !pending && arg == "-C" {
                pending = true;
                return arg;
            }
            if pending {
                std::env::set_current_dir(&arg).ok();
                pending = false;
            }
            arg
        })
        .collect()
}
