//! # The Lockfile
//!
//! Captures the exact installed revision of every remote package so a
//! setup can be reproduced elsewhere, in the spirit of Cargo.lock but as a
//! deliberately minimal line protocol.
//!
//! ## On-Disk Format
//!
//! Line-oriented UTF-8. Blank lines and lines beginning with `#` are
//! ignored. Each data line is
//!
//! ```text
//! name|source|commit|timestamp
//! ```
//!
//! pipe-delimited with exactly three separators: the package name, the
//! canonical source URL at freeze time, the full 40-character revision
//! hash, and integer seconds since the epoch. Entries exist only for
//! remote packages; local trees are never recorded.
//!
//! Writes are atomic: the file is written to a sibling temporary file and
//! renamed into place. Entries serialize in name order so diffs stay
//! minimal.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::git::{CloneRequest, Git};
use crate::id::{self, Name};
use crate::package::Ref;
use crate::registry::{Filter, Registry};

//================================================================================================
// Types
//================================================================================================

/// The pinned state of one installed remote package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledState {
    /// The full 40-character revision hash.
    pub commit: String,
    /// The canonical source URL at freeze time.
    pub source: String,
    /// Seconds since the epoch when the entry was frozen.
    pub timestamp: u64,
}

/// The pinned set of installed revisions, keyed by package name.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Lockfile {
    entries: BTreeMap<Name, InstalledState>,
}

/// An error reading, writing, or reconciling the lockfile.
#[derive(Error, Debug)]
pub enum LockError {
    /// A data line does not have exactly three separators.
    #[error("lockfile line {line}: expected name|source|commit|timestamp")]
    Malformed {
        /// 1-indexed line number.
        line: usize,
    },
    /// A commit field is not a full 40-character hash.
    #[error("lockfile line {line}: '{commit}' is not a full revision hash")]
    BadCommit {
        /// 1-indexed line number.
        line: usize,
        /// The rejected commit field.
        commit: String,
    },
    /// A timestamp field is not an integer.
    #[error("lockfile line {line}: invalid timestamp")]
    BadTimestamp {
        /// 1-indexed line number.
        line: usize,
    },
    /// A name field is not a valid package name.
    #[error("lockfile line {line}: {source}")]
    BadName {
        /// 1-indexed line number.
        line: usize,
        /// The underlying validation failure.
        source: id::Error,
    },
    /// An I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The atomic rename failed.
    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
}

/// How one package compares against its lockfile entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffState {
    /// The working tree is at the recorded commit.
    Unchanged,
    /// The working tree has moved away from the recorded commit.
    Drifted {
        /// The revision the lockfile records.
        locked: String,
        /// The revision currently checked out.
        actual: String,
    },
    /// The lockfile records the package but no working tree exists.
    Missing,
    /// A working tree exists but the lockfile does not record it.
    Untracked,
}

/// Counters for a freeze or restore batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Packages processed successfully.
    pub completed: usize,
    /// Packages that failed; details were logged.
    pub failures: usize,
}

//================================================================================================
// Impls
//================================================================================================

impl Lockfile {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the line protocol.
    pub fn parse(text: &str) -> Result<Self, LockError> {
        let mut entries = BTreeMap::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = trimmed.split('|').collect();
            let [name, source, commit, timestamp] = fields.as_slice() else {
                return Err(LockError::Malformed { line });
            };

            let name =
                Name::try_from(*name).map_err(|source| LockError::BadName { line, source })?;
            if !is_full_hash(commit) {
                return Err(LockError::BadCommit {
                    line,
                    commit: (*commit).to_owned(),
                });
            }
            let timestamp: u64 = timestamp
                .parse()
                .map_err(|_| LockError::BadTimestamp { line })?;

            entries.insert(name, InstalledState {
                commit: (*commit).to_owned(),
                source: (*source).to_owned(),
                timestamp,
            });
        }

        Ok(Lockfile { entries })
    }

    /// Renders the line protocol, entries in name order.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::from("# name|source|commit|timestamp\n");
        for (name, state) in &self.entries {
            out.push_str(&format!(
                "{name}|{}|{}|{}\n",
                state.source, state.commit, state.timestamp
            ));
        }
        out
    }

    /// Loads the lockfile from disk; a missing file is an empty set.
    pub fn load(path: &Path) -> Result<Self, LockError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no lockfile present");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the lockfile atomically: a sibling temp file is written in
    /// full, then renamed over the destination.
    pub fn store(&self, path: &Path) -> Result<(), LockError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(self.serialize().as_bytes())?;
        tmp.persist(path)?;
        Ok(())
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, name: Name, state: InstalledState) {
        self.entries.insert(name, state);
    }

    /// Looks up an entry by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&InstalledState> {
        self.entries.get(name)
    }

    /// Iterates entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&Name, &InstalledState)> {
        self.entries.iter()
    }

    /// The number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no entry is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Pins every enabled, installed, remote package at its current working
/// tree revision.
///
/// Per-package failures are logged and counted; the returned lockfile
/// contains every package that could be read.
pub async fn freeze(registry: &Registry, git: &Git, now: u64) -> (Lockfile, BatchReport) {
    let mut lockfile = Lockfile::new();
    let mut report = BatchReport::default();

    for record in registry.each(Filter::InstalledEnabled) {
        if record.local {
            continue;
        }
        match git.rev_parse_head(&record.path).await {
            Ok(commit) if is_full_hash(&commit) => {
                lockfile.insert(record.name.clone(), InstalledState {
                    commit,
                    source: record.source.clone(),
                    timestamp: now,
                });
                report.completed += 1;
            }
            Ok(commit) => {
                error!(package = %record.name, %commit, "unexpected revision format");
                report.failures += 1;
            }
            Err(e) => {
                error!(package = %record.name, error = %e, "cannot read working tree revision");
                report.failures += 1;
            }
        }
    }

    (lockfile, report)
}

/// Re-clones every lockfile entry into its canonical managed path and
/// checks out the recorded commit. Local packages are never in the
/// lockfile and are untouched.
pub async fn restore(lockfile: &Lockfile, git: &Git, packages_dir: &Path) -> BatchReport {
    let mut report = BatchReport::default();

    for (name, state) in lockfile.entries() {
        let dest = packages_dir.join(name.as_str());

        // A stale checkout may not contain the recorded commit at all;
        // when it cannot be pinned in place, re-clone from scratch.
        if dest.join(".git").exists() && git.checkout(&dest, &state.commit).await.is_ok() {
            report.completed += 1;
            continue;
        }
        if dest.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dest) {
                error!(package = %name, error = %e, "cannot clear stale working tree");
                report.failures += 1;
                continue;
            }
        }

        let result = git
            .clone_into(&CloneRequest {
                source: state.source.clone(),
                dest,
                r#ref: Ref::Commit(state.commit.clone()),
                packages_dir: packages_dir.to_path_buf(),
            })
            .await;

        match result {
            Ok(_) => report.completed += 1,
            Err(e) => {
                error!(package = %name, error = %e, "restore failed");
                report.failures += 1;
            }
        }
    }

    report
}

/// Compares the lockfile against the working trees on disk.
///
/// Output is sorted by name: every lockfile entry classifies as
/// unchanged, drifted, or missing, followed by installed remote packages
/// the lockfile does not track.
pub async fn diff(
    lockfile: &Lockfile,
    registry: &Registry,
    git: &Git,
) -> Vec<(Name, DiffState)> {
    let mut result = Vec::new();

    for (name, state) in lockfile.entries() {
        let path = registry
            .record(name)
            .map(|r| r.path.clone())
            .unwrap_or_else(|| registry.packages_dir().join(name.as_str()));

        if !path.join(".git").exists() {
            result.push((name.clone(), DiffState::Missing));
            continue;
        }
        match git.rev_parse_head(&path).await {
            Ok(actual) if actual == state.commit => {
                result.push((name.clone(), DiffState::Unchanged));
            }
            Ok(actual) => {
                result.push((name.clone(), DiffState::Drifted {
                    locked: state.commit.clone(),
                    actual,
                }));
            }
            Err(e) => {
                warn!(package = %name, error = %e, "cannot read working tree revision");
                result.push((name.clone(), DiffState::Missing));
            }
        }
    }

    let mut untracked: Vec<(Name, DiffState)> = registry
        .each(Filter::InstalledEnabled)
        .filter(|r| !r.local && lockfile.get(&r.name).is_none())
        .map(|r| (r.name.clone(), DiffState::Untracked))
        .collect();
    untracked.sort_by(|a, b| a.0.cmp(&b.0));
    result.extend(untracked);

    result
}

fn is_full_hash(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Field;
    use crate::testutil::{commit_file, file_url, fixture_repo, sh};

    const HASH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HASH_B: &str = "0123456789abcdef0123456789abcdef01234567";

    fn sample() -> Lockfile {
        let mut lock = Lockfile::new();
        lock.insert("zeta".parse().unwrap(), InstalledState {
            commit: HASH_A.into(),
            source: "https://example.com/zeta.git".into(),
            timestamp: 1700000000,
        });
        lock.insert("alpha".parse().unwrap(), InstalledState {
            commit: HASH_B.into(),
            source: "https://example.com/alpha.git".into(),
            timestamp: 1700000001,
        });
        lock
    }

    #[test]
    fn serialization_round_trips() {
        let lock = sample();
        assert_eq!(Lockfile::parse(&lock.serialize()).unwrap(), lock);
    }

    #[test]
    fn entries_serialize_in_name_order() {
        let text = sample().serialize();
        let alpha = text.find("alpha|").unwrap();
        let zeta = text.find("zeta|").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let text = format!("\n# comment\n\nalpha|src|{HASH_A}|12\n");
        let lock = Lockfile::parse(&text).unwrap();
        assert_eq!(lock.len(), 1);
        assert_eq!(lock.get("alpha").unwrap().timestamp, 12);
    }

    #[test]
    fn malformed_lines_name_their_line_number() {
        let text = format!("alpha|src|{HASH_A}|12\nbroken|line\n");
        match Lockfile::parse(&text).unwrap_err() {
            LockError::Malformed { line } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn short_hashes_are_rejected() {
        let text = "alpha|src|abc123|12\n";
        assert!(matches!(
            Lockfile::parse(text).unwrap_err(),
            LockError::BadCommit { line: 1, .. }
        ));
    }

    #[test]
    fn extra_separators_are_rejected() {
        let text = format!("alpha|src|extra|{HASH_A}|12\n");
        assert!(matches!(
            Lockfile::parse(&text).unwrap_err(),
            LockError::Malformed { line: 1 }
        ));
    }

    #[test]
    fn bad_timestamps_are_rejected() {
        let text = format!("alpha|src|{HASH_A}|soon\n");
        assert!(matches!(
            Lockfile::parse(&text).unwrap_err(),
            LockError::BadTimestamp { line: 1 }
        ));
    }

    #[test]
    fn store_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state/lock");
        let lock = sample();
        lock.store(&path).unwrap();
        assert_eq!(Lockfile::load(&path).unwrap(), lock);
    }

    #[test]
    fn loading_a_missing_lockfile_yields_an_empty_set() {
        let lock = Lockfile::load(Path::new("/nonexistent/sheaf/lock")).unwrap();
        assert!(lock.is_empty());
    }

    fn declare(reg: &mut Registry, id: &str, fields: &[&str]) -> Name {
        let fields: Vec<Field> = fields.iter().map(|f| Field::parse(f).unwrap()).collect();
        reg.declare(id, &fields).unwrap()
    }

    async fn install(git: &Git, reg: &Registry, name: &str) {
        let record = reg.record(name).unwrap();
        git.clone_into(&CloneRequest {
            source: record.source.clone(),
            dest: record.path.clone(),
            r#ref: record.r#ref.clone(),
            packages_dir: reg.packages_dir().clone(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn freeze_records_installed_remote_packages_only() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        let head = fixture_repo(&source);

        let local_dir = tmp.path().join("local-plugin");
        std::fs::create_dir_all(&local_dir).unwrap();

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &file_url(&source), &["as=pinned"]);
        declare(&mut reg, &local_dir.to_string_lossy(), &[]);

        let git = Git::new();
        install(&git, &reg, "pinned").await;

        let (lock, report) = freeze(&reg, &git, 1700000000).await;
        assert_eq!(report, BatchReport { completed: 1, failures: 0 });
        assert_eq!(lock.len(), 1);

        let state = lock.get("pinned").unwrap();
        assert_eq!(state.commit, head);
        assert_eq!(state.source, file_url(&source));
        assert_eq!(state.timestamp, 1700000000);
    }

    #[tokio::test]
    async fn restore_reproduces_the_frozen_commits() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        fixture_repo(&source);

        let packages = tmp.path().join("packages");
        let mut reg = Registry::new(packages.clone());
        declare(&mut reg, &file_url(&source), &["as=plugin"]);

        let git = Git::new();
        install(&git, &reg, "plugin").await;
        let (lock, _) = freeze(&reg, &git, 1).await;
        let frozen = lock.get("plugin").unwrap().commit.clone();

        // The source moves on; restore must still land on the frozen
        // commit.
        commit_file(&source, "later.zsh");
        std::fs::remove_dir_all(&packages).unwrap();

        let report = restore(&lock, &git, &packages).await;
        assert_eq!(report, BatchReport { completed: 1, failures: 0 });
        assert_eq!(
            git.rev_parse_head(&packages.join("plugin")).await.unwrap(),
            frozen
        );
    }

    #[tokio::test]
    async fn diff_classifies_every_state() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        fixture_repo(&source);
        let drift_source = tmp.path().join("drift-source");
        fixture_repo(&drift_source);
        let extra_source = tmp.path().join("extra-source");
        fixture_repo(&extra_source);

        let packages = tmp.path().join("packages");
        let mut reg = Registry::new(packages.clone());
        declare(&mut reg, &file_url(&source), &["as=steady"]);
        declare(&mut reg, &file_url(&drift_source), &["as=drifty"]);
        declare(&mut reg, &file_url(&extra_source), &["as=extra"]);

        let git = Git::new();
        for name in ["steady", "drifty", "extra"] {
            install(&git, &reg, name).await;
        }

        let (mut lock, _) = freeze(&reg, &git, 1).await;

        // drifty moves ahead, ghost never existed on disk, extra is
        // dropped from the lockfile.
        let drifty = packages.join("drifty");
        sh(&drifty, &["config", "user.email", "t@example.com"]);
        sh(&drifty, &["config", "user.name", "T"]);
        commit_file(&drifty, "drift.zsh");
        lock.insert("ghost".parse().unwrap(), InstalledState {
            commit: HASH_A.into(),
            source: "https://example.com/ghost.git".into(),
            timestamp: 1,
        });
        let mut trimmed = Lockfile::new();
        for (name, state) in lock.entries() {
            if name.as_str() != "extra" {
                trimmed.insert(name.clone(), state.clone());
            }
        }

        let states: std::collections::HashMap<String, DiffState> = diff(&trimmed, &reg, &git)
            .await
            .into_iter()
            .map(|(n, s)| (n.to_string(), s))
            .collect();

        assert_eq!(states["steady"], DiffState::Unchanged);
        assert!(matches!(states["drifty"], DiffState::Drifted { .. }));
        assert_eq!(states["ghost"], DiffState::Missing);
        assert_eq!(states["extra"], DiffState::Untracked);
    }
}
