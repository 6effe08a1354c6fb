//! Core value types describing a declared package.
//!
//! A package is the pairing of a [`PackageRecord`] (identity, source, pinned
//! revision, load behavior) with a [`PackageConfig`] (the side effects it
//! asks the host session for). Both are owned exclusively by the
//! [`crate::registry::Registry`] and always looked up by name.

use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;

use crate::id::Name;

//================================================================================================
// Types
//================================================================================================

/// The revision a package is pinned to. At most one variant is ever set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Ref {
    /// Track the remote default branch.
    #[default]
    None,
    /// Track a named branch.
    Branch(String),
    /// Pin to a tag.
    Tag(String),
    /// Pin to an exact commit.
    Commit(String),
}

/// When a package's entry point is sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Apply configuration and rely on function autoloading; the entry point
    /// is not sourced.
    Autoload,
    /// Apply configuration and source the entry point during the pipeline.
    #[default]
    Now,
    /// Excluded from the pipeline entirely; loaded only on explicit request.
    Manual,
}

/// One declared package, keyed by name in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    /// The unique package name.
    pub name: Name,
    /// Canonical URL, or an absolute filesystem path when `local`.
    pub source: String,
    /// The on-disk working tree. For remote packages this lives under the
    /// managed packages directory; for local packages it is `source` itself.
    pub path: PathBuf,
    /// The pinned revision, if any.
    pub r#ref: Ref,
    /// True when `source` is a filesystem path.
    pub local: bool,
    /// Canonical URL used for updates when `local` is true, letting a local
    /// tree track a remote.
    pub url_override: Option<String>,
    /// When the entry point is sourced.
    pub load_mode: LoadMode,
    /// Shell snippet run after install or update.
    pub build: Option<String>,
    /// Disabled records are kept for diagnostics but excluded from
    /// resolution and loading.
    pub disabled: bool,
    /// Relative or absolute path to the entry point, overriding the search.
    pub entry_override: Option<String>,
}

/// The configuration fields a package projects onto the host session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageConfig {
    /// `NAME=VALUE` environment exports, in declaration order.
    pub env: Vec<String>,
    /// Directories prepended to the executable search path; relative
    /// entries resolve against the record's path.
    pub paths: Vec<String>,
    /// Directories prepended to the function search path.
    pub fpaths: Vec<String>,
    /// `name=value` alias definitions.
    pub aliases: Vec<String>,
    /// Dependency specifiers, `name` or `name@constraint`.
    pub depends: Vec<String>,
    /// Shell snippet evaluated after entry-point sourcing, with `PKG_DIR`
    /// and `PKG_NAME` injected.
    pub rc: Option<String>,
}

//================================================================================================
// Impls
//================================================================================================

impl Ref {
    /// Returns true when no revision is pinned.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Ref::None)
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::None => write!(f, "default"),
            Ref::Branch(b) => write!(f, "branch={b}"),
            Ref::Tag(t) => write!(f, "tag={t}"),
            Ref::Commit(c) => write!(f, "commit={c}"),
        }
    }
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "autoload" => Ok(LoadMode::Autoload),
            "now" => Ok(LoadMode::Now),
            "manual" => Ok(LoadMode::Manual),
            other => Err(other.to_owned()),
        }
    }
}

impl Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadMode::Autoload => "autoload",
            LoadMode::Now => "now",
            LoadMode::Manual => "manual",
        };
        f.write_str(s)
    }
}

impl PackageRecord {
    /// Returns true unless the record is disabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.disabled
    }

    /// Returns true when a working tree exists on disk. Remote packages
    /// must contain a checkout, not just a directory.
    #[must_use]
    pub fn installed(&self) -> bool {
        if self.local {
            self.path.is_dir()
        } else {
            self.path.join(".git").exists()
        }
    }

    /// The URL updates should be fetched from, if the package tracks one.
    #[must_use]
    pub fn update_url(&self) -> Option<&str> {
        if self.local {
            self.url_override.as_deref()
        } else {
            Some(&self.source)
        }
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_mode_round_trips() {
        for mode in [LoadMode::Autoload, LoadMode::Now, LoadMode::Manual] {
            assert_eq!(mode.to_string().parse::<LoadMode>().unwrap(), mode);
        }
        assert!("eager".parse::<LoadMode>().is_err());
    }

    #[test]
    fn update_url_prefers_override_for_local_trees() {
        let record = PackageRecord {
            name: "dotfiles".parse().unwrap(),
            source: "/home/user/dotfiles".into(),
            path: "/home/user/dotfiles".into(),
            r#ref: Ref::None,
            local: true,
            url_override: Some("https://example.com/dotfiles.git".into()),
            load_mode: LoadMode::Now,
            build: None,
            disabled: false,
            entry_override: None,
        };
        assert_eq!(record.update_url(), Some("https://example.com/dotfiles.git"));
    }
}
