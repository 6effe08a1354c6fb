//! # The Git Adapter
//!
//! Drives the `git` binary to clone, update, and inspect package working
//! trees. The client is treated as a black box: its stderr is carried
//! through [`GitError`] verbatim so diagnostics show exactly what the tool
//! said.
//!
//! ## Clone Strategy
//!
//! Given a pinned [`Ref`], in order of preference:
//!
//! 1. `commit` — a full clone followed by a detached checkout of that
//!    revision (a shallow clone cannot be guaranteed to contain it).
//! 2. `tag` or `branch` — a single-branch shallow clone of that ref. If
//!    the ref does not exist on the remote, any partial destination is
//!    deleted (only when it lives under the managed packages directory)
//!    and the default strategy is tried instead.
//! 3. otherwise — a single-branch shallow clone of the remote default
//!    branch.
//!
//! A destination that already contains a checkout short-circuits to
//! success without touching the network.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::package::Ref;

//================================================================================================
// Types
//================================================================================================

/// An error from the git client.
#[derive(Error, Debug)]
pub enum GitError {
    /// The git binary could not be spawned.
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
    /// A git command exited non-zero; `stderr` is the tool's own message.
    #[error("git {op} failed: {stderr}")]
    Command {
        /// The git subcommand that failed.
        op: String,
        /// The client's stderr, verbatim.
        stderr: String,
    },
}

/// What to clone and where.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    /// Canonical source URL.
    pub source: String,
    /// Destination working tree.
    pub dest: PathBuf,
    /// The pinned revision.
    pub r#ref: Ref,
    /// The managed packages directory; partial clones are only deleted
    /// when the destination lives under it.
    pub packages_dir: PathBuf,
}

/// The result of a clone task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cloned {
    /// True when the working tree was created by this task; false when a
    /// checkout already existed.
    pub fresh: bool,
}

/// The result of an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Updated {
    /// The revision before the update.
    pub old: String,
    /// The revision after the update.
    pub new: String,
}

/// Handle to the git command-line client.
#[derive(Debug, Clone)]
pub struct Git {
    program: OsString,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for Git {
    fn default() -> Self {
        Git {
            program: OsString::from("git"),
        }
    }
}

impl Updated {
    /// Returns true when the update moved the working tree.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.old != self.new
    }
}

impl Git {
    /// Creates the adapter for the `git` binary on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports the client's version string, for diagnostics.
    pub async fn version(&self) -> Result<String, GitError> {
        self.run(["--version"]).await
    }

    /// Ensures a working tree exists at the request's destination matching
    /// the requested revision.
    pub async fn clone_into(&self, req: &CloneRequest) -> Result<Cloned, GitError> {
        if req.dest.join(".git").exists() {
            debug!(dest = %req.dest.display(), "checkout already present, skipping clone");
            return Ok(Cloned { fresh: false });
        }

        match &req.r#ref {
            Ref::Commit(commit) => {
                self.run([
                    OsStr::new("clone"),
                    OsStr::new(&req.source),
                    req.dest.as_os_str(),
                ])
                .await?;
                self.checkout(&req.dest, commit).await?;
            }
            Ref::Tag(name) | Ref::Branch(name) => {
                let pinned = self
                    .run([
                        OsStr::new("clone"),
                        OsStr::new("--depth"),
                        OsStr::new("1"),
                        OsStr::new("--single-branch"),
                        OsStr::new("--branch"),
                        OsStr::new(name),
                        OsStr::new(&req.source),
                        req.dest.as_os_str(),
                    ])
                    .await;
                if let Err(e) = pinned {
                    warn!(source = %req.source, r#ref = name, error = %e, "pinned clone failed, falling back to the default branch");
                    if req.dest.starts_with(&req.packages_dir) {
                        let _ = tokio::fs::remove_dir_all(&req.dest).await;
                    }
                    self.clone_default(req).await?;
                }
            }
            Ref::None => self.clone_default(req).await?,
        }

        Ok(Cloned { fresh: true })
    }

    async fn clone_default(&self, req: &CloneRequest) -> Result<(), GitError> {
        self.run([
            OsStr::new("clone"),
            OsStr::new("--depth"),
            OsStr::new("1"),
            OsStr::new("--single-branch"),
            OsStr::new(&req.source),
            req.dest.as_os_str(),
        ])
        .await?;
        Ok(())
    }

    /// Returns the full revision hash of the working tree's HEAD.
    pub async fn rev_parse_head(&self, dir: &Path) -> Result<String, GitError> {
        self.run([
            OsStr::new("-C"),
            dir.as_os_str(),
            OsStr::new("rev-parse"),
            OsStr::new("HEAD"),
        ])
        .await
    }

    /// Detaches the working tree at `rev`.
    pub async fn checkout(&self, dir: &Path, rev: &str) -> Result<(), GitError> {
        self.run([
            OsStr::new("-C"),
            dir.as_os_str(),
            OsStr::new("checkout"),
            OsStr::new("--detach"),
            OsStr::new(rev),
        ])
        .await?;
        Ok(())
    }

    /// Brings the working tree up to date with its remote for the pinned
    /// revision, returning the old and new HEAD hashes.
    ///
    /// Commit-pinned trees never move.
    pub async fn update(&self, dir: &Path, r#ref: &Ref) -> Result<Updated, GitError> {
        let old = self.rev_parse_head(dir).await?;

        match r#ref {
            Ref::Commit(_) => {
                return Ok(Updated {
                    old: old.clone(),
                    new: old,
                });
            }
            Ref::Tag(tag) => {
                self.run([
                    OsStr::new("-C"),
                    dir.as_os_str(),
                    OsStr::new("fetch"),
                    OsStr::new("--depth"),
                    OsStr::new("1"),
                    OsStr::new("--force"),
                    OsStr::new("origin"),
                    OsStr::new("tag"),
                    OsStr::new(tag),
                ])
                .await?;
                self.checkout(dir, tag).await?;
            }
            Ref::Branch(_) | Ref::None => {
                self.run([
                    OsStr::new("-C"),
                    dir.as_os_str(),
                    OsStr::new("pull"),
                    OsStr::new("--ff-only"),
                ])
                .await?;
            }
        }

        let new = self.rev_parse_head(dir).await?;
        Ok(Updated { old, new })
    }

    async fn run<I, S>(&self, args: I) -> Result<String, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        const SUBCOMMANDS: &[&str] =
            &["clone", "checkout", "fetch", "pull", "rev-parse", "--version"];

        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let op = args
            .iter()
            .map(|a| a.to_string_lossy())
            .find(|a| SUBCOMMANDS.contains(&a.as_ref()))
            .unwrap_or_default()
            .into_owned();

        debug!(?args, "running git");
        let output = Command::new(&self.program).args(&args).output().await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
        } else {
            Err(GitError::Command {
                op,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::testutil::{commit_file, file_url, fixture_repo, sh};

    fn request(source: &Path, dest: &Path, r#ref: Ref, packages_dir: &Path) -> CloneRequest {
        CloneRequest {
            source: file_url(source),
            dest: dest.to_path_buf(),
            r#ref,
            packages_dir: packages_dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn clones_the_default_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        let packages = tmp.path().join("packages");
        let head = fixture_repo(&source);

        let git = Git::new();
        let req = request(&source, &packages.join("plugin"), Ref::None, &packages);
        let cloned = git.clone_into(&req).await.unwrap();

        assert!(cloned.fresh);
        assert!(req.dest.join("plugin.zsh").exists());
        assert_eq!(git.rev_parse_head(&req.dest).await.unwrap(), head);
    }

    #[tokio::test]
    async fn existing_checkouts_short_circuit() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        let packages = tmp.path().join("packages");
        fixture_repo(&source);

        let git = Git::new();
        let req = request(&source, &packages.join("plugin"), Ref::None, &packages);
        assert!(git.clone_into(&req).await.unwrap().fresh);

        // A second run must succeed without a fresh clone even if the
        // source disappears.
        fs::remove_dir_all(&source).unwrap();
        assert!(!git.clone_into(&req).await.unwrap().fresh);
    }

    #[tokio::test]
    async fn clones_a_tag_when_pinned() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        let packages = tmp.path().join("packages");
        fixture_repo(&source);
        let tagged = commit_file(&source, "tagged.zsh");
        sh(&source, &["tag", "v1"]);
        commit_file(&source, "after.zsh");

        let git = Git::new();
        let req = request(
            &source,
            &packages.join("plugin"),
            Ref::Tag("v1".into()),
            &packages,
        );
        git.clone_into(&req).await.unwrap();
        assert_eq!(git.rev_parse_head(&req.dest).await.unwrap(), tagged);
    }

    #[tokio::test]
    async fn missing_ref_falls_back_to_the_default_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        let packages = tmp.path().join("packages");
        let head = fixture_repo(&source);

        let git = Git::new();
        let req = request(
            &source,
            &packages.join("plugin"),
            Ref::Branch("no-such-branch".into()),
            &packages,
        );
        git.clone_into(&req).await.unwrap();
        assert_eq!(git.rev_parse_head(&req.dest).await.unwrap(), head);
    }

    #[tokio::test]
    async fn commit_pins_get_a_full_clone_and_checkout() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        let packages = tmp.path().join("packages");
        let first = fixture_repo(&source);
        commit_file(&source, "later.zsh");

        let git = Git::new();
        let req = request(
            &source,
            &packages.join("plugin"),
            Ref::Commit(first.clone()),
            &packages,
        );
        git.clone_into(&req).await.unwrap();
        assert_eq!(git.rev_parse_head(&req.dest).await.unwrap(), first);
    }

    #[tokio::test]
    async fn unreachable_sources_surface_the_client_message() {
        let tmp = tempfile::tempdir().unwrap();
        let packages = tmp.path().join("packages");

        let git = Git::new();
        let req = CloneRequest {
            source: format!("file://{}/does-not-exist", tmp.path().display()),
            dest: packages.join("ghost"),
            r#ref: Ref::None,
            packages_dir: packages.clone(),
        };
        let err = git.clone_into(&req).await.unwrap_err();
        match err {
            GitError::Command { op, stderr } => {
                assert_eq!(op, "clone");
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn update_fast_forwards_a_branch_checkout() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        let packages = tmp.path().join("packages");
        let old = fixture_repo(&source);

        let git = Git::new();
        let req = request(&source, &packages.join("plugin"), Ref::None, &packages);
        git.clone_into(&req).await.unwrap();

        let new = commit_file(&source, "update.zsh");
        let updated = git.update(&req.dest, &Ref::None).await.unwrap();
        assert_eq!(updated.old, old);
        assert_eq!(updated.new, new);
        assert!(updated.changed());
    }

    #[tokio::test]
    async fn update_never_moves_a_commit_pin() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        let packages = tmp.path().join("packages");
        let first = fixture_repo(&source);

        let git = Git::new();
        let req = request(
            &source,
            &packages.join("plugin"),
            Ref::Commit(first.clone()),
            &packages,
        );
        git.clone_into(&req).await.unwrap();
        commit_file(&source, "newer.zsh");

        let updated = git
            .update(&req.dest, &Ref::Commit(first.clone()))
            .await
            .unwrap();
        assert_eq!(updated.old, first);
        assert!(!updated.changed());
    }
}
