//! Device layer errors.

use std::path::PathBuf;

use strand_bus::BusError;
use thiserror::Error;

/// Errors surfaced by devices, the plugin and the configuration store.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A configuration value is unusable and has no safe fallback.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The bus transport failed to come up.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Failed to read the preferences file.
    #[error("failed to read preferences '{path}': {source}")]
    ReadPreferences {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The preferences file is not valid TOML.
    #[error("failed to parse preferences '{path}': {source}")]
    ParsePreferences {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Failed to serialize preferences for saving.
    #[error("failed to serialize preferences: {0}")]
    SerializePreferences(#[from] toml::ser::Error),

    /// Failed to write the preferences file.
    #[error("failed to write preferences '{path}': {source}")]
    WritePreferences {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to list the bus device directory.
    #[error("failed to enumerate bus devices in '{path}': {source}")]
    EnumerateDevices {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
