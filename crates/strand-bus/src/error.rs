//! Bus transport errors.

use thiserror::Error;

/// Errors surfaced by writers and backends.
///
/// Everything except `ShortWrite`/`Write` is fatal to initialization:
/// a bus that fails to open, configure or acquire its GPIO lines is not
/// registered. Write failures are logged and counted by the writer thread,
/// which keeps running.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus device file could not be opened.
    #[error("failed to open bus device '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Setting mode, word size or speed on the bus failed.
    #[error("failed to configure bus device '{path}': {source}")]
    Configure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// `write` was called before `init`.
    #[error("bus device '{path}' is not initialized")]
    NotInitialized { path: String },

    /// The bus accepted fewer bytes than requested.
    #[error("short write to '{path}': {written} of {expected} bytes")]
    ShortWrite {
        path: String,
        written: usize,
        expected: usize,
    },

    /// The transfer itself failed.
    #[error("failed to write to bus device '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A GPIO select line could not be exported or configured.
    #[error("failed to acquire GPIO line {pin}: {source}")]
    GpioAcquire {
        pin: u16,
        #[source]
        source: sysfs_gpio::Error,
    },

    /// The writer thread could not be spawned.
    #[error("failed to spawn bus writer thread: {0}")]
    SpawnThread(#[source] std::io::Error),
}
