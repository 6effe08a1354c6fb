//! Field appliers: projections of one configuration field each onto the
//! host session.
//!
//! All appliers silently no-op on empty fields and are idempotent per
//! package and session (the loader guarantees a package is applied at most
//! once). Malformed entries are skipped with a warning; only a session
//! failure propagates.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::package::{PackageConfig, PackageRecord};
use crate::session::{HostSession, SessionError};

//================================================================================================
// Functions
//================================================================================================

/// Exports every `NAME=VALUE` entry of the package's `env` field.
pub fn apply_env<S: HostSession>(
    session: &mut S,
    record: &PackageRecord,
    config: &PackageConfig,
) -> Result<(), SessionError> {
    for entry in &config.env {
        match entry.split_once('=') {
            Some((name, value)) if !name.is_empty() => session.export_env(name, value)?,
            _ => warn!(package = %record.name, entry = %entry, "skipping malformed env entry"),
        }
    }
    Ok(())
}

/// Prepends each existing `path` directory to the executable search path.
///
/// Relative entries resolve against the package path; directories that do
/// not exist are skipped.
pub fn apply_paths<S: HostSession>(
    session: &mut S,
    record: &PackageRecord,
    config: &PackageConfig,
) -> Result<(), SessionError> {
    for entry in &config.paths {
        let dir = resolve(record, entry);
        if dir.is_dir() {
            session.prepend_search_path(&dir)?;
        } else {
            debug!(package = %record.name, dir = %dir.display(), "skipping non-existent path entry");
        }
    }
    Ok(())
}

/// Defines every `name=value` alias of the package.
pub fn apply_aliases<S: HostSession>(
    session: &mut S,
    record: &PackageRecord,
    config: &PackageConfig,
) -> Result<(), SessionError> {
    for entry in &config.aliases {
        match entry.split_once('=') {
            Some((name, value)) if !name.is_empty() => session.add_alias(name, value)?,
            _ => warn!(package = %record.name, entry = %entry, "skipping malformed alias entry"),
        }
    }
    Ok(())
}

/// Prepends each `fpath` directory to the function search path and
/// registers its non-hidden files for autoloading.
///
/// A file's autoload name is its basename with the source-file suffix
/// stripped.
pub fn apply_fpaths<S: HostSession>(
    session: &mut S,
    record: &PackageRecord,
    config: &PackageConfig,
    suffix: &str,
) -> Result<(), SessionError> {
    for entry in &config.fpaths {
        let dir = resolve(record, entry);
        let Ok(entries) = fs::read_dir(&dir) else {
            debug!(package = %record.name, dir = %dir.display(), "skipping non-existent fpath entry");
            continue;
        };

        let dot_suffix = format!(".{suffix}");
        let mut functions: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_owned))
            .filter(|n| !n.starts_with('.'))
            .map(|n| n.strip_suffix(&dot_suffix).map(str::to_owned).unwrap_or(n))
            .collect();
        functions.sort();

        session.register_autoload(&dir, &functions)?;
    }
    Ok(())
}

/// Evaluates the package's rc snippet with `PKG_DIR` and `PKG_NAME` bound.
pub fn apply_rc<S: HostSession>(
    session: &mut S,
    record: &PackageRecord,
    config: &PackageConfig,
) -> Result<(), SessionError> {
    let Some(rc) = &config.rc else {
        return Ok(());
    };
    let dir = record.path.to_string_lossy();
    session.eval_snippet(rc, &[("PKG_DIR", dir.as_ref()), ("PKG_NAME", record.name.as_str())])
}

fn resolve(record: &PackageRecord, entry: &str) -> PathBuf {
    let path = Path::new(entry);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        record.path.join(path)
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{LoadMode, Ref};
    use crate::session::MemorySession;

    fn record(path: &Path) -> PackageRecord {
        PackageRecord {
            name: "demo".parse().unwrap(),
            source: "https://example.com/demo.git".into(),
            path: path.to_path_buf(),
            r#ref: Ref::None,
            local: false,
            url_override: None,
            load_mode: LoadMode::Now,
            build: None,
            disabled: false,
            entry_override: None,
        }
    }

    #[test]
    fn env_entries_are_exported_and_malformed_ones_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let record = record(tmp.path());
        let config = PackageConfig {
            env: vec!["GOOD=1".into(), "noequals".into(), "=empty".into()],
            ..Default::default()
        };

        let mut session = MemorySession::default();
        apply_env(&mut session, &record, &config).unwrap();
        assert_eq!(session.env, [("GOOD".into(), "1".into())]);
    }

    #[test]
    fn relative_paths_resolve_against_the_package_and_missing_ones_skip() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("bin")).unwrap();
        let record = record(tmp.path());
        let config = PackageConfig {
            paths: vec!["bin".into(), "no-such-dir".into()],
            ..Default::default()
        };

        let mut session = MemorySession::default();
        apply_paths(&mut session, &record, &config).unwrap();
        assert_eq!(session.search_paths, [tmp.path().join("bin")]);
    }

    #[test]
    fn fpath_functions_register_with_the_suffix_stripped() {
        let tmp = tempfile::tempdir().unwrap();
        let functions = tmp.path().join("functions");
        fs::create_dir(&functions).unwrap();
        fs::write(functions.join("widget.zsh"), "").unwrap();
        fs::write(functions.join("bare"), "").unwrap();
        fs::write(functions.join(".hidden"), "").unwrap();

        let record = record(tmp.path());
        let config = PackageConfig {
            fpaths: vec!["functions".into()],
            ..Default::default()
        };

        let mut session = MemorySession::default();
        apply_fpaths(&mut session, &record, &config, "zsh").unwrap();
        assert_eq!(
            session.autoloads,
            [(functions, vec!["bare".into(), "widget".into()])]
        );
    }

    #[test]
    fn rc_snippets_carry_the_package_variables() {
        let tmp = tempfile::tempdir().unwrap();
        let record = record(tmp.path());
        let config = PackageConfig {
            rc: Some("echo hi".into()),
            ..Default::default()
        };

        let mut session = MemorySession::default();
        apply_rc(&mut session, &record, &config).unwrap();

        let (snippet, env) = &session.snippets[0];
        assert_eq!(snippet, "echo hi");
        assert!(env.contains(&("PKG_NAME".into(), "demo".into())));
        assert!(env
            .iter()
            .any(|(k, v)| k == "PKG_DIR" && v == &tmp.path().to_string_lossy()));
    }

    #[test]
    fn empty_fields_are_silent_no_ops() {
        let tmp = tempfile::tempdir().unwrap();
        let record = record(tmp.path());
        let config = PackageConfig::default();

        let mut session = MemorySession::default();
        apply_env(&mut session, &record, &config).unwrap();
        apply_paths(&mut session, &record, &config).unwrap();
        apply_aliases(&mut session, &record, &config).unwrap();
        apply_fpaths(&mut session, &record, &config, "zsh").unwrap();
        apply_rc(&mut session, &record, &config).unwrap();

        assert!(session.env.is_empty());
        assert!(session.search_paths.is_empty());
        assert!(session.aliases.is_empty());
        assert!(session.autoloads.is_empty());
        assert!(session.snippets.is_empty());
    }
}
