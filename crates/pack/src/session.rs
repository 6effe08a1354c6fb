//! # The Host Session Interface
//!
//! The shell session whose environment, search paths, and alias table the
//! manager mutates is process-global and lives outside this program. It is
//! modelled behind the [`HostSession`] trait so the pipeline can be driven
//! against either of two implementations:
//!
//! - [`ScriptSession`] renders every effect into an eval-able POSIX/zsh
//!   script. The CLI prints it to stdout after the pipeline, so a shell
//!   picks the effects up with `eval "$(sheaf install)"`.
//! - [`MemorySession`] records effects in memory and is the substitute
//!   used by tests.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

//================================================================================================
// Types
//================================================================================================

/// An error applying an effect to the host session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A snippet was rejected or exited non-zero; `detail` is the shell's
    /// own message.
    #[error("snippet failed: {detail}")]
    Snippet {
        /// The shell's stderr.
        detail: String,
    },
    /// The session could not be driven at all.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The mutations a package may request of the host shell session.
pub trait HostSession {
    /// Exports `name=value` into the session environment.
    fn export_env(&mut self, name: &str, value: &str) -> Result<(), SessionError>;

    /// Prepends `dir` to the executable search path.
    fn prepend_search_path(&mut self, dir: &Path) -> Result<(), SessionError>;

    /// Defines an alias.
    fn add_alias(&mut self, name: &str, value: &str) -> Result<(), SessionError>;

    /// Prepends `dir` to the function search path and registers the named
    /// functions for autoloading.
    fn register_autoload(&mut self, dir: &Path, functions: &[String]) -> Result<(), SessionError>;

    /// Sources a script file into the session.
    fn source_script(&mut self, path: &Path) -> Result<(), SessionError>;

    /// Evaluates a snippet with the given variables bound around it.
    fn eval_snippet(&mut self, snippet: &str, env: &[(&str, &str)]) -> Result<(), SessionError>;
}

/// Renders session effects into an eval-able shell script.
#[derive(Debug, Default)]
pub struct ScriptSession {
    lines: Vec<String>,
}

/// An in-memory session double that records every effect.
#[derive(Debug, Default)]
pub struct MemorySession {
    /// Exported variables, in application order.
    pub env: Vec<(String, String)>,
    /// Prepended search-path directories, in application order.
    pub search_paths: Vec<PathBuf>,
    /// Defined aliases, in application order.
    pub aliases: Vec<(String, String)>,
    /// Registered autoload directories with their function names.
    pub autoloads: Vec<(PathBuf, Vec<String>)>,
    /// Sourced script files, in application order.
    pub sourced: Vec<PathBuf>,
    /// Evaluated snippets with their injected variables.
    pub snippets: Vec<(String, Vec<(String, String)>)>,
    /// When set, every `eval_snippet` call fails.
    pub fail_snippets: bool,
}

//================================================================================================
// Impls
//================================================================================================

impl ScriptSession {
    /// Creates an empty session script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the accumulated script.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Returns true when no effect has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl HostSession for ScriptSession {
    fn export_env(&mut self, name: &str, value: &str) -> Result<(), SessionError> {
        self.lines.push(format!("export {name}={}", quote(value)));
        Ok(())
    }

    fn prepend_search_path(&mut self, dir: &Path) -> Result<(), SessionError> {
        self.lines.push(format!(
            "PATH={}:\"$PATH\"",
            quote(&dir.to_string_lossy())
        ));
        Ok(())
    }

    fn add_alias(&mut self, name: &str, value: &str) -> Result<(), SessionError> {
        self.lines.push(format!("alias {name}={}", quote(value)));
        Ok(())
    }

    fn register_autoload(&mut self, dir: &Path, functions: &[String]) -> Result<(), SessionError> {
        self.lines.push(format!(
            "fpath=({} $fpath)",
            quote(&dir.to_string_lossy())
        ));
        if !functions.is_empty() {
            self.lines
                .push(format!("autoload -Uz {}", functions.join(" ")));
        }
        Ok(())
    }

    fn source_script(&mut self, path: &Path) -> Result<(), SessionError> {
        self.lines
            .push(format!("source {}", quote(&path.to_string_lossy())));
        Ok(())
    }

    fn eval_snippet(&mut self, snippet: &str, env: &[(&str, &str)]) -> Result<(), SessionError> {
        // The snippet itself only runs once the user evals the rendered
        // script; a syntax check up front is the one failure this session
        // can still observe.
        let check = Command::new("sh").arg("-n").arg("-c").arg(snippet).output()?;
        if !check.status.success() {
            return Err(SessionError::Snippet {
                detail: String::from_utf8_lossy(&check.stderr).trim().to_owned(),
            });
        }

        for (name, value) in env {
            self.lines.push(format!("{name}={}", quote(value)));
        }
        self.lines.push(snippet.trim_end().to_owned());
        if !env.is_empty() {
            let names: Vec<&str> = env.iter().map(|(name, _)| *name).collect();
            self.lines.push(format!("unset {}", names.join(" ")));
        }
        Ok(())
    }
}

impl HostSession for MemorySession {
    fn export_env(&mut self, name: &str, value: &str) -> Result<(), SessionError> {
        self.env.push((name.to_owned(), value.to_owned()));
        Ok(())
    }

    fn prepend_search_path(&mut self, dir: &Path) -> Result<(), SessionError> {
        self.search_paths.push(dir.to_path_buf());
        Ok(())
    }

    fn add_alias(&mut self, name: &str, value: &str) -> Result<(), SessionError> {
        self.aliases.push((name.to_owned(), value.to_owned()));
        Ok(())
    }

    fn register_autoload(&mut self, dir: &Path, functions: &[String]) -> Result<(), SessionError> {
        self.autoloads.push((dir.to_path_buf(), functions.to_vec()));
        Ok(())
    }

    fn source_script(&mut self, path: &Path) -> Result<(), SessionError> {
        self.sourced.push(path.to_path_buf());
        Ok(())
    }

    fn eval_snippet(&mut self, snippet: &str, env: &[(&str, &str)]) -> Result<(), SessionError> {
        if self.fail_snippets {
            return Err(SessionError::Snippet {
                detail: "forced failure".into(),
            });
        }
        self.snippets.push((
            snippet.to_owned(),
            env.iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        ));
        Ok(())
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Single-quotes a string for safe embedding in a shell word.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_session_renders_effects_in_order() {
        let mut session = ScriptSession::new();
        session.export_env("FZF_HOME", "/opt/fzf").unwrap();
        session.prepend_search_path(Path::new("/opt/fzf/bin")).unwrap();
        session.add_alias("v", "nvim").unwrap();
        session
            .register_autoload(Path::new("/opt/fzf/functions"), &["widget".into()])
            .unwrap();
        session.source_script(Path::new("/opt/fzf/plugin.zsh")).unwrap();

        let script = session.render();
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(
            lines,
            [
                "export FZF_HOME='/opt/fzf'",
                "PATH='/opt/fzf/bin':\"$PATH\"",
                "alias v='nvim'",
                "fpath=('/opt/fzf/functions' $fpath)",
                "autoload -Uz widget",
                "source '/opt/fzf/plugin.zsh'",
            ]
        );
    }

    #[test]
    fn snippets_are_wrapped_with_their_variables() {
        let mut session = ScriptSession::new();
        session
            .eval_snippet("echo ok", &[("PKG_DIR", "/opt/x"), ("PKG_NAME", "x")])
            .unwrap();

        let script = session.render();
        assert!(script.contains("PKG_DIR='/opt/x'"));
        assert!(script.contains("PKG_NAME='x'"));
        assert!(script.contains("echo ok"));
        assert!(script.contains("unset PKG_DIR PKG_NAME"));
    }

    #[test]
    fn syntactically_broken_snippets_are_rejected() {
        let mut session = ScriptSession::new();
        let err = session.eval_snippet("if then fi done", &[]).unwrap_err();
        assert!(matches!(err, SessionError::Snippet { .. }));
        assert!(session.is_empty());
    }

    #[test]
    fn quoting_survives_embedded_quotes() {
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn memory_session_records_everything() {
        let mut session = MemorySession::default();
        session.export_env("A", "1").unwrap();
        session.eval_snippet("true", &[("PKG_NAME", "x")]).unwrap();

        assert_eq!(session.env, [("A".into(), "1".into())]);
        assert_eq!(session.snippets.len(), 1);
        assert_eq!(session.snippets[0].1, [("PKG_NAME".into(), "x".into())]);
    }
}
