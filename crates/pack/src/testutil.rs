//! Shared fixtures for tests that need real git repositories.

use std::fs;
use std::path::Path;
use std::process::Command;

/// Runs git in `dir`, panicking on failure, returning trimmed stdout.
pub fn sh(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git invocation failed");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

/// Creates a repository with a `plugin.zsh` commit and returns the hash.
pub fn fixture_repo(dir: &Path) -> String {
    fs::create_dir_all(dir).unwrap();
    sh(dir, &["init"]);
    sh(dir, &["config", "user.email", "test@example.com"]);
    sh(dir, &["config", "user.name", "Test"]);
    fs::write(dir.join("plugin.zsh"), "echo loaded\n").unwrap();
    sh(dir, &["add", "."]);
    sh(dir, &["commit", "-m", "initial"]);
    sh(dir, &["rev-parse", "HEAD"])
}

/// Adds a commit touching `file` and returns the new HEAD hash.
pub fn commit_file(dir: &Path, file: &str) -> String {
    fs::write(dir.join(file), file).unwrap();
    sh(dir, &["add", "."]);
    sh(dir, &["commit", "-m", file]);
    sh(dir, &["rev-parse", "HEAD"])
}

/// A `file://` URL for a fixture repository.
pub fn file_url(dir: &Path) -> String {
    format!("file://{}", dir.display())
}
