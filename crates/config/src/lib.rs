//! Manages application configuration by loading settings from standard locations.
//!
//! This crate provides a unified configuration object ([`Config`]) that aggregates
//! settings from files and environment variables, making them accessible
//! globally via a lazily initialized static reference ([`CONFIG`]).
//!
//! Besides user-tunable settings, the crate is the single source of truth for
//! every on-disk location the manager touches:
//!
//! | Path | Purpose |
//! |---|---|
//! | `$DATA/sheaf/packages/` | Installed package working trees. |
//! | `$DATA/sheaf/state/lock` | Lockfile. |
//! | `$DATA/sheaf/cache/` | Scratch space. |
//! | `$CONFIG/sheaf/config` | Script-layer declarations. |
//! | `$CONFIG/sheaf/packages/<name>/` | Filesystem-layout declarations. |
//! | `$CONFIG/sheaf/pkgs.d/*.sheaf` | Aggregated declaration scripts. |
//! | `$CONFIG/sheaf/sheaf.toml` | Settings consumed by this crate. |

use std::path::PathBuf;
use std::sync::LazyLock;

use etcetera::BaseStrategy;
use figment::providers::{Env, Format, Toml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};

/// The default configuration values
const DEFAULT_TOML_CONFIG: &str = include_str!("./sheaf.default.toml");

/// The application directory name used under the XDG base directories.
pub const APP_DIR: &str = "sheaf";

/// The file extension of aggregated declaration scripts under `pkgs.d/`.
pub const PKGSD_EXT: &str = "sheaf";

//================================================================================================
// Statics
//================================================================================================

/// Provides a lazily instantiated static reference to the application `Config`.
///
/// This static variable ensures that configuration is parsed only once from
/// canonical locations and then made immutably available throughout the
/// application's lifecycle.
pub static CONFIG: LazyLock<Config> = LazyLock::new(load_config);

//================================================================================================
// Types
//================================================================================================

/// Represents the application's primary configuration structure.
#[derive(Deserialize, Serialize, Default)]
pub struct Config {
    /// Settings describing the host shell dialect.
    #[serde(default)]
    pub shell: ShellConfig,
    /// Root directories for state and configuration.
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Root directories for everything the manager reads or writes.
#[derive(Deserialize, Serialize)]
pub struct PathsConfig {
    /// The root directory for mutable state (packages, lockfile, cache).
    pub data: PathBuf,
    /// The root directory for user configuration layers.
    pub config: PathBuf,
}

/// Settings describing the host shell dialect.
#[derive(Deserialize, Serialize)]
pub struct ShellConfig {
    /// The source-file suffix used when searching for package entry points
    /// (`init.<suffix>`, `plugin.<suffix>`, `<name>.<suffix>`).
    pub suffix: String,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data: get_data_dir(),
            config: get_config_dir(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            suffix: "zsh".into(),
        }
    }
}

impl Config {
    /// The directory holding installed package working trees.
    pub fn packages_dir(&self) -> PathBuf {
        self.paths.data.join("packages")
    }

    /// The directory holding persistent manager state.
    pub fn state_dir(&self) -> PathBuf {
        self.paths.data.join("state")
    }

    /// The lockfile location.
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("lock")
    }

    /// The scratch directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.paths.data.join("cache")
    }

    /// The script-layer configuration file.
    pub fn script_path(&self) -> PathBuf {
        self.paths.config.join("config")
    }

    /// The root of the filesystem-layout configuration layer.
    pub fn package_config_dir(&self) -> PathBuf {
        self.paths.config.join("packages")
    }

    /// The directory of aggregated declaration scripts.
    pub fn pkgsd_dir(&self) -> PathBuf {
        self.paths.config.join("pkgs.d")
    }

    /// Constructs a `Figment` instance for configuration loading.
    ///
    /// This method builds a configuration provider by layering default settings,
    /// the user's `sheaf.toml`, and `SHEAF_`-prefixed environment variables.
    pub fn figment() -> Figment {
        let mut fig = Figment::from(Config::default()).merge(Toml::string(DEFAULT_TOML_CONFIG));

        if let Ok(c) = etcetera::choose_base_strategy() {
            let config = c.config_dir().join(APP_DIR).join("sheaf.toml");
            fig = fig.admerge(Toml::file(config));
        }

        fig.admerge(Env::prefixed("SHEAF_").split("_"))
    }

    /// Creates a `Config` instance from a given provider.
    pub fn from<T: Provider>(provider: T) -> Result<Config, Box<figment::Error>> {
        Figment::from(provider).extract().map_err(Box::new)
    }
}

impl Provider for Config {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("Sheaf CLI Config")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(self).data()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Returns the current user's home directory, if one can be determined.
pub fn home_dir() -> Option<PathBuf> {
    etcetera::home_dir().ok()
}

/// Determines the data directory for mutable state.
fn get_data_dir() -> PathBuf {
    if let Ok(c) = etcetera::choose_base_strategy() {
        c.data_dir().join(APP_DIR)
    } else {
        std::env::temp_dir().join(APP_DIR)
    }
}

/// Determines the directory holding user configuration layers.
fn get_config_dir() -> PathBuf {
    if let Ok(c) = etcetera::choose_base_strategy() {
        c.config_dir().join(APP_DIR)
    } else {
        std::env::temp_dir().join(APP_DIR)
    }
}

/// Loads the application configuration using the default `Figment` provider.
///
/// This function is used to initialize the `CONFIG` static variable.
fn load_config() -> Config {
    Config::figment().extract().unwrap_or_else(|e| {
        tracing::error!(error = %e, "problem loading config from default sources, falling back to built-in defaults");
        Config::default()
    })
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn default_shell_suffix() {
        let config = Config::from(Config::default()).unwrap();
        assert_eq!(config.shell.suffix, "zsh");
    }

    #[test]
    #[serial]
    fn env_overrides_suffix() {
        temp_env::with_var("SHEAF_SHELL_SUFFIX", Some("ksh"), || {
            let config: Config = Config::figment().extract().unwrap();
            assert_eq!(config.shell.suffix, "ksh");
        });
    }

    #[test]
    fn derived_paths_hang_off_the_roots() {
        let config = Config::default();
        assert!(config.lock_path().starts_with(&config.paths.data));
        assert!(config.packages_dir().ends_with("packages"));
        assert!(config.pkgsd_dir().starts_with(&config.paths.config));
    }
}
