//! # Configuration Ingestion
//!
//! Declarations reach the registry through three layers, each later layer
//! overwriting the earlier ones package-by-package:
//!
//! 1. **Script layer** — the user's `config` file, a line-oriented
//!    declaration script (`pack <id> field…` / `disable <name>`).
//! 2. **Filesystem layer** — one directory per package under
//!    `packages/<name>/`, where each file is a scalar field and each
//!    subdirectory an array field.
//! 3. **Aggregation layer** — every `*.sheaf` file under `pkgs.d/`,
//!    executed as an additional script layer in filename order.
//!
//! Rejected declarations are reported and skipped; ingestion never aborts.

use std::fs;
use std::path::Path;

use tracing::{debug, error, warn};

use crate::hooks::Hooks;
use crate::registry::{DeclarationError, Field, Registry};

//================================================================================================
// Types
//================================================================================================

/// Counters accumulated across ingestion layers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Declarations accepted into the registry.
    pub declared: usize,
    /// Declarations rejected (reported to stderr).
    pub errors: usize,
}

//================================================================================================
// Impls
//================================================================================================

impl IngestReport {
    /// Folds another report into this one.
    pub fn merge(&mut self, other: IngestReport) {
        self.declared += other.declared;
        self.errors += other.errors;
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Ingests all three configuration layers in order.
pub fn ingest_all(config: &config::Config, registry: &mut Registry, hooks: &Hooks) -> IngestReport {
    let mut report = IngestReport::default();
    report.merge(ingest_script_file(
        &config.script_path(),
        registry,
        hooks,
    ));
    report.merge(ingest_package_dirs(&config.package_config_dir(), registry));
    report.merge(ingest_pkgsd(&config.pkgsd_dir(), registry, hooks));
    report
}

/// Runs a declaration script sourced from `origin` against the registry.
pub fn run_script(
    text: &str,
    origin: &str,
    registry: &mut Registry,
    hooks: &Hooks,
) -> IngestReport {
    let mut report = IngestReport::default();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let words = match tokenize(line) {
            Ok(words) => words,
            Err(e) => {
                error!(origin, line = lineno + 1, error = %e, "rejecting declaration");
                report.errors += 1;
                continue;
            }
        };

        let mut words = words.into_iter();
        let directive = words.next().unwrap_or_default();
        match directive.as_str() {
            "pack" => {
                let Some(id) = words.next() else {
                    error!(origin, line = lineno + 1, "pack directive without an identifier");
                    report.errors += 1;
                    continue;
                };
                match parse_fields(words) {
                    Ok(fields) => match registry.declare(&id, &fields) {
                        Ok(name) => {
                            debug!(origin, %name, "declared package");
                            report.declared += 1;
                        }
                        Err(e) => {
                            error!(origin, line = lineno + 1, id = %id, error = %e, "rejecting declaration");
                            report.errors += 1;
                        }
                    },
                    Err(e) => {
                        error!(origin, line = lineno + 1, id = %id, error = %e, "rejecting declaration");
                        report.errors += 1;
                    }
                }
            }
            "disable" => {
                let Some(name) = words.next() else {
                    error!(origin, line = lineno + 1, "disable directive without a name");
                    report.errors += 1;
                    continue;
                };
                if !registry.disable(&name, hooks) {
                    warn!(origin, line = lineno + 1, package = %name, "disable of an undeclared package");
                }
            }
            other => {
                error!(origin, line = lineno + 1, directive = other, "unknown directive");
                report.errors += 1;
            }
        }
    }

    report
}

/// Runs the script layer from a file; a missing file is not an error.
pub fn ingest_script_file(path: &Path, registry: &mut Registry, hooks: &Hooks) -> IngestReport {
    match fs::read_to_string(path) {
        Ok(text) => run_script(&text, &path.display().to_string(), registry, hooks),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => IngestReport::default(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "cannot read configuration script");
            IngestReport {
                declared: 0,
                errors: 1,
            }
        }
    }
}

/// Ingests the directory-per-package filesystem layer.
///
/// Each subdirectory of `root` declares one package: the `source` file is
/// required, every other regular file is a scalar field, and the
/// subdirectories `path/`, `fpath/`, `depends/`, `alias/`, and `env/` are
/// array fields.
pub fn ingest_package_dirs(root: &Path, registry: &mut Registry) -> IngestReport {
    let mut report = IngestReport::default();
    let Ok(entries) = fs::read_dir(root) else {
        return report;
    };

    let mut dirs: Vec<_> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.path())
        .collect();
    dirs.sort();

    for dir in dirs {
        let Some(pkg_name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            continue;
        };
        match package_dir_fields(&dir, &pkg_name) {
            Ok((id, fields)) => match registry.declare(&id, &fields) {
                Ok(name) => {
                    debug!(dir = %dir.display(), %name, "declared package");
                    report.declared += 1;
                }
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "rejecting declaration");
                    report.errors += 1;
                }
            },
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "rejecting declaration");
                report.errors += 1;
            }
        }
    }

    report
}

/// Runs every `*.sheaf` script under `dir` as an additional script layer,
/// in filename order.
pub fn ingest_pkgsd(dir: &Path, registry: &mut Registry, hooks: &Hooks) -> IngestReport {
    let mut report = IngestReport::default();
    let Ok(entries) = fs::read_dir(dir) else {
        return report;
    };

    let mut scripts: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(config::PKGSD_EXT)
        })
        .collect();
    scripts.sort();

    for script in scripts {
        report.merge(ingest_script_file(&script, registry, hooks));
    }

    report
}

/// Reads one package directory into `(id, fields)`.
fn package_dir_fields(dir: &Path, pkg_name: &str) -> std::io::Result<(String, Vec<Field>)> {
    const SCALARS: &[&str] = &[
        "branch",
        "tag",
        "commit",
        "as",
        "local",
        "load",
        "build",
        "disabled",
        "source_file",
        "url",
    ];

    let id = first_line(&fs::read_to_string(dir.join("source"))?);

    let mut fields = Vec::new();
    let mut explicit_as = false;

    let mut entries: Vec<_> = fs::read_dir(dir)?.flatten().map(|e| e.path()).collect();
    entries.sort();

    for path in entries {
        let Some(entry_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned)
        else {
            continue;
        };
        if entry_name.starts_with('.') || entry_name == "source" {
            continue;
        }

        if path.is_dir() {
            match entry_name.as_str() {
                "path" | "fpath" => {
                    fields.push(field(&entry_name, array_of_entry_names(&path)?));
                }
                "depends" => {
                    let mut deps = Vec::new();
                    for (dep, content) in keyed_entries(&path)? {
                        let constraint = first_line(&content);
                        if constraint.is_empty() {
                            deps.push(dep);
                        } else {
                            deps.push(format!("{dep}@{constraint}"));
                        }
                    }
                    fields.push(field("depends", deps));
                }
                "alias" | "env" => {
                    let mut pairs = Vec::new();
                    for (key, content) in keyed_entries(&path)? {
                        pairs.push(format!("{key}={}", first_line(&content)));
                    }
                    fields.push(field(&entry_name, pairs));
                }
                other => {
                    warn!(dir = %dir.display(), entry = other, "ignoring unknown array field directory");
                }
            }
        } else if entry_name == "rc" {
            // The rc snippet keeps its full contents; every other scalar is
            // its file's first line.
            fields.push(Field {
                key: "rc".into(),
                value: crate::registry::FieldValue::Scalar(fs::read_to_string(&path)?),
            });
        } else {
            let value = first_line(&fs::read_to_string(&path)?);
            if entry_name == "as" {
                explicit_as = true;
            }
            if !SCALARS.contains(&entry_name.as_str()) {
                warn!(dir = %dir.display(), entry = %entry_name, "ignoring unknown declaration field");
                continue;
            }
            fields.push(Field {
                key: entry_name,
                value: crate::registry::FieldValue::Scalar(value),
            });
        }
    }

    // The directory name is the package name unless an `as` file overrides
    // it.
    if !explicit_as {
        fields.push(Field {
            key: "as".into(),
            value: crate::registry::FieldValue::Scalar(pkg_name.to_owned()),
        });
    }

    Ok((id, fields))
}

fn field(key: &str, values: Vec<String>) -> Field {
    Field {
        key: key.to_owned(),
        value: crate::registry::FieldValue::Array(values),
    }
}

fn array_of_entry_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .flatten()
        .filter_map(|e| e.file_name().to_str().map(str::to_owned))
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

fn keyed_entries(dir: &Path) -> std::io::Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut entries: Vec<_> = fs::read_dir(dir)?.flatten().map(|e| e.path()).collect();
    entries.sort();
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || !path.is_file() {
            continue;
        }
        pairs.push((name.to_owned(), fs::read_to_string(&path).unwrap_or_default()));
    }
    Ok(pairs)
}

fn first_line(content: &str) -> String {
    content.lines().next().unwrap_or("").trim().to_owned()
}

fn parse_fields(words: impl Iterator<Item = String>) -> Result<Vec<Field>, DeclarationError> {
    words.map(|w| Field::parse(&w)).collect()
}

/// Splits a declaration line into words, honoring single and double quotes
/// and keeping `key=(…)` groups together.
fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut quote: Option<char> = None;
    let mut parens: usize = 0;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    started = true;
                }
                '(' => {
                    parens += 1;
                    current.push(c);
                    started = true;
                }
                ')' => {
                    parens = parens.saturating_sub(1);
                    current.push(c);
                    started = true;
                }
                c if c.is_whitespace() && parens == 0 => {
                    if started {
                        words.push(std::mem::take(&mut current));
                        started = false;
                    }
                }
                c => {
                    current.push(c);
                    started = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err(TokenizeError::UnterminatedQuote);
    }
    if parens != 0 {
        return Err(TokenizeError::UnterminatedGroup);
    }
    if started {
        words.push(current);
    }
    Ok(words)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
enum TokenizeError {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("unterminated parenthesis group")]
    UnterminatedGroup,
}

//================================================================================================
// Tests
//================================================================================================
