//! Sheaf, a declarative package manager for shell plugins.
//!
//! The binary is a thin shell over the [`pack`] crate: argument parsing,
//! logging setup, and subcommand dispatch live here; every package
//! semantic lives in `pack`.

#![warn(missing_docs)]

pub mod cli;
