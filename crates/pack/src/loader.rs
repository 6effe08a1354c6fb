//! # The Two-Pass Load Pipeline
//!
//! The loader walks the resolver's order twice:
//!
//! - **Pass 1 (fan-out)** submits a clone task to the keyed pool for every
//!   candidate package whose working tree is missing, without reading any
//!   result. Clones run concurrently, hiding network latency.
//! - **Pass 2 (ordered drain)** walks the order again, awaiting each
//!   package's clone (if one is pending) and then applying its
//!   configuration: env, then search path, then aliases, then function
//!   path, then entry-point sourcing and the rc snippet.
//!
//! The ordered drain is what guarantees a dependent's environment sees
//! every dependency's effects already applied. A failed clone fails only
//! its own package; siblings continue, and the failure count is surfaced
//! in the final [`LoadReport`].

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::apply;
use crate::git::{CloneRequest, Cloned, Git, GitError};
use crate::hooks::{Event, Hooks};
use crate::id::Name;
use crate::package::{LoadMode, PackageRecord};
use crate::pool::Pool;
use crate::registry::Registry;
use crate::session::HostSession;

//================================================================================================
// Types
//================================================================================================

/// Counters accumulated over one pipeline run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Packages whose configuration was applied this run.
    pub loaded: usize,
    /// Packages freshly installed this run.
    pub installed: usize,
    /// Packages that failed to install or build.
    pub failures: usize,
}

/// Drives the two-pass install/load pipeline over a resolved registry.
pub struct Loader<'a, S: HostSession> {
    registry: &'a Registry,
    hooks: &'a Hooks,
    session: &'a mut S,
    git: Git,
    suffix: String,
    pool: Pool<Result<Cloned, GitError>>,
    loaded: HashSet<Name>,
}

//================================================================================================
// Impls
//================================================================================================

impl<'a, S: HostSession> Loader<'a, S> {
    /// Creates a loader over a registry whose load order is populated.
    pub fn new(
        registry: &'a Registry,
        hooks: &'a Hooks,
        session: &'a mut S,
        suffix: impl Into<String>,
    ) -> Self {
        Loader {
            registry,
            hooks,
            session,
            git: Git::new(),
            suffix: suffix.into(),
            pool: Pool::new(),
            loaded: HashSet::new(),
        }
    }

    /// Runs both passes. With `only`, the pipeline is restricted to that
    /// package and its transitive dependencies.
    pub async fn run(&mut self, only: Option<&str>) -> LoadReport {
        let allowed = only.map(|target| transitive_closure(self.registry, target));
        let order: Vec<Name> = self.registry.load_order().to_vec();

        self.fan_out(&order, allowed.as_ref());
        let report = self.drain(&order, allowed.as_ref()).await;

        self.hooks.fire(Event::Ready, None);
        report
    }

    /// Pass 1: submit clone tasks; read no results.
    fn fan_out(&mut self, order: &[Name], allowed: Option<&HashSet<Name>>) {
        let registry: &'a Registry = self.registry;
        for name in order {
            let Some(record) = registry.record(name) else {
                continue;
            };
            if !self.candidate(record, allowed) || record.local || record.path.exists() {
                continue;
            }

            self.hooks.fire(Event::PreInstall, Some(name));
            let git = self.git.clone();
            let request = CloneRequest {
                source: record.source.clone(),
                dest: record.path.clone(),
                r#ref: record.r#ref.clone(),
                packages_dir: registry.packages_dir().clone(),
            };
            debug!(package = %name, source = %request.source, "scheduling install");
            self.pool
                .defer(name.clone(), async move { git.clone_into(&request).await });
        }
    }

    /// Pass 2: consume clone results and apply configuration in order.
    async fn drain(&mut self, order: &[Name], allowed: Option<&HashSet<Name>>) -> LoadReport {
        let registry: &'a Registry = self.registry;
        let mut report = LoadReport::default();

        for name in order {
            let Some((record, config)) = registry.lookup(name) else {
                continue;
            };
            if !self.candidate(record, allowed) {
                continue;
            }

            let mut fresh = false;
            let pending = self.pool.drain(name);
            let had_future = pending.is_some();
            if let Some(ticket) = pending {
                match ticket.join().await {
                    Ok(Ok(cloned)) => {
                        self.hooks.fire(Event::PostInstall, Some(name));
                        fresh = cloned.fresh;
                        if fresh {
                            info!(package = %name, "installed");
                            report.installed += 1;
                        }
                    }
                    Ok(Err(e)) => {
                        error!(package = %name, error = %e, "install failed");
                        report.failures += 1;
                        continue;
                    }
                    Err(e) => {
                        error!(package = %name, error = %e, "install task died");
                        report.failures += 1;
                        continue;
                    }
                }
            }

            if !record.path.exists() && !record.local && !had_future {
                warn!(package = %name, path = %record.path.display(), "package directory missing");
                continue;
            }

            if fresh {
                if let Some(build) = &record.build {
                    if let Err(detail) = run_build(record, build).await {
                        error!(package = %name, error = %detail, "build failed");
                        report.failures += 1;
                        continue;
                    }
                }
            }

            self.apply(record, config);
            self.loaded.insert(name.clone());
            report.loaded += 1;
        }

        report
    }

    fn apply(&mut self, record: &PackageRecord, config: &crate::package::PackageConfig) {
        let name = &record.name;

        if let Err(e) = apply::apply_env(self.session, record, config) {
            warn!(package = %name, error = %e, "env application failed");
        }
        if let Err(e) = apply::apply_paths(self.session, record, config) {
            warn!(package = %name, error = %e, "path application failed");
        }
        if let Err(e) = apply::apply_aliases(self.session, record, config) {
            warn!(package = %name, error = %e, "alias application failed");
        }
        if let Err(e) = apply::apply_fpaths(self.session, record, config, &self.suffix) {
            warn!(package = %name, error = %e, "fpath application failed");
        }

        self.hooks.fire(Event::PreLoad, Some(name));

        if record.load_mode == LoadMode::Now {
            match self.find_entry(record) {
                Some(entry) => {
                    if let Err(e) = self.session.source_script(&entry) {
                        warn!(package = %name, error = %e, "sourcing the entry point failed");
                    }
                }
                None => warn!(package = %name, "no entry point found"),
            }
        }

        if let Err(e) = apply::apply_rc(self.session, record, config) {
            warn!(package = %name, error = %e, "rc snippet failed");
        }

        self.hooks.fire(Event::PostLoad, Some(name));
    }

    /// Locates the file to source for a `load=now` package.
    ///
    /// An `entry_override` wins, resolved against the package path when
    /// relative; otherwise the first of `init.<sfx>`, `plugin.<sfx>`,
    /// `<name>.<sfx>` that exists. Absence is not an error.
    fn find_entry(&self, record: &PackageRecord) -> Option<PathBuf> {
        if let Some(over) = &record.entry_override {
            let path = PathBuf::from(over);
            let path = if path.is_absolute() {
                path
            } else {
                record.path.join(path)
            };
            if !path.starts_with(&record.path) {
                warn!(package = %record.name, entry = %path.display(), "entry point lies outside the package directory");
            }
            return path.is_file().then_some(path);
        }

        [
            format!("init.{}", self.suffix),
            format!("plugin.{}", self.suffix),
            format!("{}.{}", record.name, self.suffix),
        ]
        .into_iter()
        .map(|candidate| record.path.join(candidate))
        .find(|p| p.is_file())
    }

    fn candidate(&self, record: &PackageRecord, allowed: Option<&HashSet<Name>>) -> bool {
        record.enabled()
            && record.load_mode != LoadMode::Manual
            && !self.loaded.contains(&record.name)
            && allowed.is_none_or(|set| set.contains(&record.name))
    }
}

//================================================================================================
// Functions
//================================================================================================

/// The target package plus every package reachable through `depends`.
fn transitive_closure(registry: &Registry, target: &str) -> HashSet<Name> {
    let mut set = HashSet::new();
    let mut stack: Vec<String> = vec![target.to_owned()];

    while let Some(name) = stack.pop() {
        let Ok(name) = name.parse::<Name>() else {
            continue;
        };
        if !set.insert(name.clone()) {
            continue;
        }
        if let Some(config) = registry.config(&name) {
            for spec in &config.depends {
                let bare = spec.split_once('@').map_or(spec.as_str(), |(b, _)| b);
                stack.push(bare.to_owned());
            }
        }
    }

    set
}

/// Runs a build snippet in the package directory with `PKG_DIR` and
/// `PKG_NAME` in the environment.
async fn run_build(record: &PackageRecord, build: &str) -> Result<(), String> {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(build)
        .current_dir(&record.path)
        .env("PKG_DIR", &record.path)
        .env("PKG_NAME", record.name.as_str())
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_owned())
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::registry::Field;
    use crate::resolve::resolve;
    use crate::session::MemorySession;
    use crate::testutil::{file_url, fixture_repo};

    fn declare(reg: &mut Registry, id: &str, fields: &[&str]) -> Name {
        let fields: Vec<Field> = fields.iter().map(|f| Field::parse(f).unwrap()).collect();
        reg.declare(id, &fields).unwrap()
    }

    /// A local plugin directory with an entry point.
    fn local_plugin(root: &std::path::Path, name: &str) -> String {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("plugin.zsh"), format!("echo {name}\n")).unwrap();
        dir.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn dependency_effects_apply_before_dependents() {
        let tmp = tempfile::tempdir().unwrap();
        let a = local_plugin(tmp.path(), "aa");
        let b = local_plugin(tmp.path(), "bb");

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &a, &["env=(FROM_A=1)"]);
        declare(&mut reg, &b, &["env=(FROM_B=1)", "depends=(aa)"]);
        let hooks = Hooks::new();
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession::default();
        let report = Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(None)
            .await;

        assert_eq!(report.loaded, 2);
        assert_eq!(report.failures, 0);
        assert_eq!(
            session.env,
            [("FROM_A".into(), "1".into()), ("FROM_B".into(), "1".into())]
        );
        assert_eq!(
            session.sourced,
            [
                tmp.path().join("aa/plugin.zsh"),
                tmp.path().join("bb/plugin.zsh"),
            ]
        );
    }

    #[tokio::test]
    async fn remote_packages_install_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        fixture_repo(&source);

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &file_url(&source), &["as=remote-plugin"]);
        let hooks = Hooks::new();
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession::default();
        let report = Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(None)
            .await;

        assert_eq!(report.installed, 1);
        assert_eq!(report.loaded, 1);
        assert!(tmp.path().join("packages/remote-plugin/plugin.zsh").exists());
        assert_eq!(
            session.sourced,
            [tmp.path().join("packages/remote-plugin/plugin.zsh")]
        );
    }

    #[tokio::test]
    async fn a_failed_clone_fails_only_its_package() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        fixture_repo(&source);

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &file_url(&source), &["as=good"]);
        declare(
            &mut reg,
            &format!("file://{}/no-such-repo", tmp.path().display()),
            &["as=bad"],
        );
        let hooks = Hooks::new();
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession::default();
        let report = Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(None)
            .await;

        assert_eq!(report.failures, 1);
        assert_eq!(report.installed, 1);
        assert_eq!(report.loaded, 1);
        assert!(tmp.path().join("packages/good").exists());
        assert!(!tmp.path().join("packages/bad").exists());
    }

    #[tokio::test]
    async fn manual_and_disabled_packages_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let a = local_plugin(tmp.path(), "auto");
        let m = local_plugin(tmp.path(), "manual-one");
        let d = local_plugin(tmp.path(), "dead");

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &a, &[]);
        declare(&mut reg, &m, &["load=manual"]);
        declare(&mut reg, &d, &["disabled=true"]);
        let hooks = Hooks::new();
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession::default();
        let report = Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(None)
            .await;

        assert_eq!(report.loaded, 1);
        assert_eq!(session.sourced, [tmp.path().join("auto/plugin.zsh")]);
    }

    #[tokio::test]
    async fn autoload_packages_get_config_but_no_entry_sourcing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = local_plugin(tmp.path(), "funcs");
        fs::create_dir(tmp.path().join("funcs/functions")).unwrap();
        fs::write(tmp.path().join("funcs/functions/widget.zsh"), "").unwrap();

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &dir, &["load=autoload", "fpath=(functions)"]);
        let hooks = Hooks::new();
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession::default();
        let report = Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(None)
            .await;

        assert_eq!(report.loaded, 1);
        assert!(session.sourced.is_empty());
        assert_eq!(session.autoloads.len(), 1);
    }

    #[tokio::test]
    async fn entry_override_wins_and_its_absence_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = local_plugin(tmp.path(), "custom");
        fs::write(tmp.path().join("custom/special.sh"), "").unwrap();

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &dir, &["source_file=special.sh"]);

        let missing = local_plugin(tmp.path(), "hollow");
        fs::remove_file(tmp.path().join("hollow/plugin.zsh")).unwrap();
        declare(&mut reg, &missing, &[]);

        let hooks = Hooks::new();
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession::default();
        let report = Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(None)
            .await;

        // Both count as loaded; only the override was sourced.
        assert_eq!(report.loaded, 2);
        assert_eq!(session.sourced, [tmp.path().join("custom/special.sh")]);
    }

    #[tokio::test]
    async fn build_snippets_run_after_a_fresh_install() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        fixture_repo(&source);

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(
            &mut reg,
            &file_url(&source),
            &["as=built", "build=echo $PKG_NAME > built.txt"],
        );
        let hooks = Hooks::new();
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession::default();
        let report = Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(None)
            .await;

        assert_eq!(report.failures, 0);
        let marker = tmp.path().join("packages/built/built.txt");
        assert_eq!(fs::read_to_string(marker).unwrap().trim(), "built");
    }

    #[tokio::test]
    async fn a_failing_build_fails_the_package() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        fixture_repo(&source);

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &file_url(&source), &["as=broken", "build=exit 3"]);
        let hooks = Hooks::new();
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession::default();
        let report = Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(None)
            .await;

        assert_eq!(report.failures, 1);
        assert_eq!(report.loaded, 0);
        assert!(session.sourced.is_empty());
    }

    #[tokio::test]
    async fn rc_failures_are_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = local_plugin(tmp.path(), "ricky");

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &dir, &["rc=echo hi"]);
        let hooks = Hooks::new();
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession {
            fail_snippets: true,
            ..Default::default()
        };
        let report = Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(None)
            .await;

        assert_eq!(report.loaded, 1);
        assert_eq!(report.failures, 0);
    }

    #[tokio::test]
    async fn hooks_fire_in_pipeline_order() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        fixture_repo(&source);

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &file_url(&source), &["as=hooked"]);
        let mut hooks = Hooks::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for event in [
            Event::PreInstall,
            Event::PostInstall,
            Event::PreLoad,
            Event::PostLoad,
            Event::Ready,
        ] {
            let seen = Arc::clone(&seen);
            hooks.on(event, "trace", move |_| {
                seen.lock().unwrap().push(event.to_string());
                Ok(())
            });
        }
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession::default();
        Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(None)
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            ["pre-install", "post-install", "pre-load", "post-load", "ready"]
        );
    }

    #[tokio::test]
    async fn only_restricts_to_the_target_and_its_dependencies() {
        let tmp = tempfile::tempdir().unwrap();
        let a = local_plugin(tmp.path(), "dep");
        let b = local_plugin(tmp.path(), "top");
        let c = local_plugin(tmp.path(), "bystander");

        let mut reg = Registry::new(tmp.path().join("packages"));
        declare(&mut reg, &a, &[]);
        declare(&mut reg, &b, &["depends=(dep)"]);
        declare(&mut reg, &c, &[]);
        let hooks = Hooks::new();
        resolve(&mut reg, &hooks).unwrap();

        let mut session = MemorySession::default();
        let report = Loader::new(&reg, &hooks, &mut session, "zsh")
            .run(Some("top"))
            .await;

        assert_eq!(report.loaded, 2);
        assert_eq!(
            session.sourced,
            [
                tmp.path().join("dep/plugin.zsh"),
                tmp.path().join("top/plugin.zsh"),
            ]
        );
    }
}
