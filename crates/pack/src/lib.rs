//! # Pack Crate
//!
//! The `pack` crate is the core of sheaf, a declarative package manager
//! for shell plugins. Users declare named packages sourced from git URLs,
//! `user/repo` shorthands, or local paths; the crate merges those
//! declarations, resolves a dependency-safe load order, installs missing
//! packages concurrently, pins revisions in a lockfile, and projects each
//! package's configuration onto the host shell session.
//!
//! ## Architecture
//!
//! The crate is organized into several key modules:
//! - [`id`] - Validated package names, the key for everything else.
//! - [`uri`] - Shorthand-to-canonical source resolution and name derivation.
//! - [`package`] - The package value types ([`PackageRecord`], [`PackageConfig`]).
//! - [`registry`] - The canonical declaration store and its merge rules.
//! - [`ingest`] - The three configuration layers feeding the registry.
//! - [`resolve`] - Topological ordering of the dependency graph.
//! - [`pool`] - The keyed pool clone tasks fan out through.
//! - [`git`] - The adapter driving the git command-line client.
//! - [`loader`] - The two-pass install/load pipeline.
//! - [`apply`] / [`session`] - Field appliers over the host-session seam.
//! - [`lock`] - Freeze, restore, and diff of pinned revisions.
//! - [`hooks`] - Named lifecycle events.
//!
//! ## Pipeline
//!
//! Startup control flow: the ingesters populate the registry, the
//! resolver writes the load order, the loader fans out clones and drains
//! them in dependency order, and the `ready` hook fires.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use pack::hooks::Hooks;
//! use pack::registry::{Field, Registry};
//!
//! let mut registry = Registry::new("/tmp/packages".into());
//! let fields = [Field::parse("branch=main").unwrap()];
//! registry.declare("user/repo", &fields).unwrap();
//!
//! let hooks = Hooks::new();
//! pack::resolve::resolve(&mut registry, &hooks).unwrap();
//! ```

#![deny(missing_docs)]

pub use self::id::Name;
pub use self::lock::Lockfile;
pub use self::package::{LoadMode, PackageConfig, PackageRecord, Ref};
pub use self::registry::Registry;

pub mod apply;
pub mod git;
pub mod hooks;
pub mod id;
pub mod ingest;
pub mod loader;
pub mod lock;
pub mod package;
pub mod pool;
pub mod registry;
pub mod resolve;
pub mod session;
pub mod uri;

#[cfg(test)]
pub(crate) mod testutil;
