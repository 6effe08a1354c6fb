//! The main entry point for the sheaf CLI.

#![warn(missing_docs)]

use std::process::ExitCode;

use clap::Parser;
use sheaf::cli::{self, Args};

//================================================================================================
// Functions
//================================================================================================

/// The main entry point for the sheaf CLI.
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_from(cli::change_directory());
    let Args { log, .. } = args;

    let _guard = cli::init_global_subscriber(log);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Ctrl+C received, terminating...");
            ExitCode::FAILURE
        }
        code = cli::run(args) => code,
    }
}
