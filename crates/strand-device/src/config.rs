//! The configuration store.
//!
//! A flat, multi-valued string key/value store persisted as TOML. Keys are
//! free-form (`<bus>-backend`, `<bus>-<port>-personality`, ...); every key
//! maps to a list of values, and single-valued keys simply use the first
//! entry. Defaults are installed through [`Preferences::set_default`],
//! which also replaces present-but-invalid values so later reads can
//! assume a parseable setting.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DeviceError;

/// Validation applied when installing a default for a key.
#[derive(Debug, Clone)]
pub enum Validator {
    /// Any string, including empty.
    AnyString,
    /// `true` or `false`.
    Bool,
    /// An unsigned integer within the inclusive range.
    UIntRange(u32, u32),
    /// A signed integer within the inclusive range.
    IntRange(i32, i32),
    /// One of a fixed set of strings.
    OneOf(&'static [&'static str]),
}

impl Validator {
    #[must_use]
    pub fn is_valid(&self, value: &str) -> bool {
        match self {
            Self::AnyString => true,
            Self::Bool => matches!(value, "true" | "false"),
            Self::UIntRange(min, max) => value
                .parse::<u32>()
                .map(|v| v >= *min && v <= *max)
                .unwrap_or(false),
            Self::IntRange(min, max) => value
                .parse::<i32>()
                .map(|v| v >= *min && v <= *max)
                .unwrap_or(false),
            Self::OneOf(options) => options.contains(&value),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    #[serde(default)]
    values: BTreeMap<String, Vec<String>>,
}

/// A flat key/value configuration store with TOML persistence.
#[derive(Debug, Default)]
pub struct Preferences {
    path: Option<PathBuf>,
    values: BTreeMap<String, Vec<String>>,
}

impl Preferences {
    /// An in-memory store; `save` becomes a no-op.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the store from `path`. A missing file yields an empty store
    /// that will be created on the first save.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref().to_path_buf();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    path: Some(path),
                    values: BTreeMap::new(),
                })
            }
            Err(source) => return Err(DeviceError::ReadPreferences { path, source }),
        };
        let file: PreferencesFile = toml::from_str(&contents)
            .map_err(|source| DeviceError::ParsePreferences { path: path.clone(), source })?;
        Ok(Self {
            path: Some(path),
            values: file.values,
        })
    }

    /// Writes the store back to the path it was loaded from.
    pub fn save(&self) -> Result<(), DeviceError> {
        let Some(path) = &self.path else {
            debug!("in-memory preferences, nothing to save");
            return Ok(());
        };
        let file = PreferencesFile {
            values: self.values.clone(),
        };
        let contents = toml::to_string_pretty(&file)?;
        fs::write(path, contents).map_err(|source| DeviceError::WritePreferences {
            path: path.clone(),
            source,
        })
    }

    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|v| !v.is_empty())
    }

    /// The first value for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values for `key` (empty for unknown keys).
    #[must_use]
    pub fn get_multiple(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replaces the values of `key` with a single value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), vec![value.into()]);
    }

    /// Appends a value to `key`.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .entry(key.to_string())
            .or_default()
            .push(value.into());
    }

    /// Installs `default` for `key` unless a valid value is already
    /// present. Returns true when the store changed.
    pub fn set_default(&mut self, key: &str, validator: &Validator, default: &str) -> bool {
        if let Some(current) = self.get(key) {
            if validator.is_valid(current) {
                return false;
            }
            warn!(key, value = current, default, "invalid preference, using default");
        }
        self.set(key, default);
        true
    }
}
