//! # The Package Registry
//!
//! The registry is the canonical in-memory store of every declaration. It
//! owns both halves of a package — the [`PackageRecord`] and its
//! [`PackageConfig`] — and enforces the merge rules:
//!
//! - names are unique; a later declaration overwrites an earlier one in
//!   full (last-writer-wins on every field),
//! - a `disabled=true` declaration stores only the name and the flag,
//! - unknown fields warn but never fail a declaration,
//! - a scalar assigned to an array-typed field becomes a one-element array.
//!
//! Declaration fields arrive pre-tokenized as [`Field`] values; the two
//! accepted shapes are `key=value` and `key=(v1 v2 …)`.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::hooks::{Event, Hooks};
use crate::id::{self, Name};
use crate::package::{LoadMode, PackageConfig, PackageRecord, Ref};
use crate::uri::{Source, UriError};

//================================================================================================
// Types
//================================================================================================

/// A single parsed declaration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// The field key, e.g. `branch` or `depends`.
    pub key: String,
    /// The field value.
    pub value: FieldValue,
}

/// The two value shapes a declaration field can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// `key=value`
    Scalar(String),
    /// `key=(v1 v2 …)`
    Array(Vec<String>),
}

/// An error that rejects a whole declaration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeclarationError {
    /// The package identifier could not be resolved.
    #[error(transparent)]
    BadSource(#[from] UriError),
    /// The package name is invalid.
    #[error("invalid package name: {0}")]
    BadName(#[from] id::Error),
    /// A field is missing its `=` separator.
    #[error("field '{0}' is missing a value")]
    MissingValue(String),
    /// An array value is missing its closing parenthesis.
    #[error("malformed array value in field '{0}'")]
    MalformedArray(String),
    /// A scalar field received an array value.
    #[error("field '{0}' does not accept an array value")]
    ArrayForScalar(String),
    /// A known field received a value it cannot parse.
    #[error("field '{key}' has invalid value '{value}'")]
    InvalidValue {
        /// The offending field key.
        key: String,
        /// The rejected value.
        value: String,
    },
}

/// Standard iteration filters for [`Registry::each`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Every declared package, disabled ones included.
    All,
    /// Enabled packages only.
    Enabled,
    /// Enabled packages with a remote source.
    RemoteEnabled,
    /// Enabled packages whose working tree exists on disk.
    InstalledEnabled,
}

/// The canonical store of package declarations.
#[derive(Default)]
pub struct Registry {
    packages_dir: PathBuf,
    records: HashMap<Name, PackageRecord>,
    configs: HashMap<Name, PackageConfig>,
    /// Names in declaration order; iteration falls back to this until the
    /// resolver has written a load order.
    order: Vec<Name>,
    load_order: Vec<Name>,
}

//================================================================================================
// Impls
//================================================================================================

impl Field {
    /// Parses a single `key=value` or `key=(v1 v2 …)` word.
    pub fn parse(word: &str) -> Result<Field, DeclarationError> {
        let (key, value) = word
            .split_once('=')
            .ok_or_else(|| DeclarationError::MissingValue(word.to_owned()))?;

        let value = if let Some(inner) = value.strip_prefix('(') {
            let inner = inner
                .strip_suffix(')')
                .ok_or_else(|| DeclarationError::MalformedArray(key.to_owned()))?;
            FieldValue::Array(inner.split_whitespace().map(str::to_owned).collect())
        } else {
            FieldValue::Scalar(value.to_owned())
        };

        Ok(Field {
            key: key.to_owned(),
            value,
        })
    }
}

impl FieldValue {
    fn scalar(&self, key: &str) -> Result<&str, DeclarationError> {
        match self {
            FieldValue::Scalar(s) => Ok(s),
            FieldValue::Array(_) => Err(DeclarationError::ArrayForScalar(key.to_owned())),
        }
    }

    /// A scalar assigned to an array field is accepted as a one-element
    /// array.
    fn array(&self) -> Vec<String> {
        match self {
            FieldValue::Scalar(s) => vec![s.to_owned()],
            FieldValue::Array(items) => items.clone(),
        }
    }
}

impl Registry {
    /// Creates an empty registry managing working trees under
    /// `packages_dir`.
    #[must_use]
    pub fn new(packages_dir: PathBuf) -> Self {
        Registry {
            packages_dir,
            ..Default::default()
        }
    }

    /// The directory remote working trees are installed under.
    #[must_use]
    pub fn packages_dir(&self) -> &PathBuf {
        &self.packages_dir
    }

    /// Registers or reconfigures a package from its identifier and fields.
    ///
    /// Returns the package name on success. A rejected declaration leaves
    /// any previous declaration of the same name untouched.
    pub fn declare(&mut self, id: &str, fields: &[Field]) -> Result<Name, DeclarationError> {
        let source: Source = id.parse()?;

        let mut name = None;
        let mut disabled = false;
        for field in fields {
            match field.key.as_str() {
                "as" => name = Some(Name::try_from(field.value.scalar("as")?)?),
                "disabled" => disabled = parse_bool(field)?,
                _ => {}
            }
        }
        let name = match name {
            Some(name) => name,
            None => source.derived_name()?,
        };

        let mut record = PackageRecord {
            name: name.clone(),
            source: source.url().to_owned(),
            path: PathBuf::new(),
            r#ref: Ref::None,
            local: source.local(),
            url_override: None,
            load_mode: LoadMode::default(),
            build: None,
            disabled,
            entry_override: None,
        };
        let mut config = PackageConfig::default();

        // A disabled declaration is stored as the bare marker record; its
        // remaining fields are deliberately left uninterpreted.
        if !disabled {
            for field in fields {
                self.apply_field(&mut record, &mut config, field)?;
            }
        }

        record.path = if record.local {
            PathBuf::from(&record.source)
        } else {
            self.packages_dir.join(name.as_str())
        };

        if !self.records.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.records.insert(name.clone(), record);
        self.configs.insert(name.clone(), config);

        Ok(name)
    }

    fn apply_field(
        &self,
        record: &mut PackageRecord,
        config: &mut PackageConfig,
        field: &Field,
    ) -> Result<(), DeclarationError> {
        let key = field.key.as_str();
        match key {
            "as" | "disabled" => {} // handled up front
            "branch" => record.r#ref = Ref::Branch(field.value.scalar(key)?.to_owned()),
            "tag" => record.r#ref = Ref::Tag(field.value.scalar(key)?.to_owned()),
            "commit" => record.r#ref = Ref::Commit(field.value.scalar(key)?.to_owned()),
            "local" => record.local = parse_bool(field)?,
            "load" => {
                let value = field.value.scalar(key)?;
                record.load_mode =
                    value
                        .parse::<LoadMode>()
                        .map_err(|value| DeclarationError::InvalidValue {
                            key: key.to_owned(),
                            value,
                        })?;
            }
            "build" => record.build = Some(field.value.scalar(key)?.to_owned()),
            "source_file" => record.entry_override = Some(field.value.scalar(key)?.to_owned()),
            "rc" => config.rc = Some(field.value.scalar(key)?.to_owned()),
            "url" => record.url_override = Some(field.value.scalar(key)?.to_owned()),
            "env" => config.env = field.value.array(),
            "path" => config.paths = field.value.array(),
            "fpath" => config.fpaths = field.value.array(),
            "alias" => config.aliases = field.value.array(),
            "depends" => config.depends = field.value.array(),
            unknown => {
                warn!(package = %record.name, field = unknown, "ignoring unknown declaration field");
            }
        }
        Ok(())
    }

    /// Disables a package at runtime, removing it from the load order.
    ///
    /// Fires `package-disabled` and returns true when the package existed.
    pub fn disable(&mut self, name: &str, hooks: &Hooks) -> bool {
        let Some(record) = self.records.get_mut(name) else {
            return false;
        };
        record.disabled = true;
        self.load_order.retain(|n| n.as_str() != name);
        hooks.fire(Event::PackageDisabled, Some(name));
        true
    }

    /// Evicts every key for `name`, returning the record for the caller to
    /// act on (e.g. deleting the working tree).
    pub fn remove(&mut self, name: &str) -> Option<PackageRecord> {
        let record = self.records.remove(name)?;
        self.configs.remove(name);
        self.order.retain(|n| n.as_str() != name);
        self.load_order.retain(|n| n.as_str() != name);
        Some(record)
    }

    /// Looks up a package by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<(&PackageRecord, &PackageConfig)> {
        let record = self.records.get(name)?;
        let config = self.configs.get(name)?;
        Some((record, config))
    }

    /// Looks up just the record half.
    #[must_use]
    pub fn record(&self, name: &str) -> Option<&PackageRecord> {
        self.records.get(name)
    }

    /// Looks up just the configuration half.
    #[must_use]
    pub fn config(&self, name: &str) -> Option<&PackageConfig> {
        self.configs.get(name)
    }

    /// Iterates packages in load order when the resolver has run, otherwise
    /// in declaration order, applying the given filter.
    pub fn each(&self, filter: Filter) -> impl Iterator<Item = &PackageRecord> {
        let names = if self.load_order.is_empty() {
            &self.order
        } else {
            &self.load_order
        };
        names
            .iter()
            .filter_map(|n| self.records.get(n))
            .filter(move |r| match filter {
                Filter::All => true,
                Filter::Enabled => r.enabled(),
                Filter::RemoteEnabled => r.enabled() && !r.local,
                Filter::InstalledEnabled => r.enabled() && r.installed(),
            })
    }

    /// Replaces the resolver-produced load order.
    pub fn set_load_order(&mut self, order: Vec<Name>) {
        self.load_order = order;
    }

    /// The resolver-produced load order; empty until resolution has run.
    #[must_use]
    pub fn load_order(&self) -> &[Name] {
        &self.load_order
    }

    /// The number of declared packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

//================================================================================================
// Functions
//================================================================================================

fn parse_bool(field: &Field) -> Result<bool, DeclarationError> {
    let value = field.value.scalar(&field.key)?;
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(DeclarationError::InvalidValue {
            key: field.key.clone(),
            value: other.to_owned(),
        }),
    }
}

//================================================================================================
// Tests
//================================================================================================
