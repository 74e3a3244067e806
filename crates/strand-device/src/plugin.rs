//! The plugin: enumerates bus devices and owns them.
//!
//! Reads `base-uid` and `device-prefix` from the configuration store,
//! finds matching device files under the device directory and brings one
//! [`Device`] up per file. Devices that fail to start are skipped; the
//! rest keep running. Stopping persists every device's state and saves
//! the store.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use strand_bus::BusStats;
use strand_proto::{Uid, UidAllocator};
use tracing::{info, warn};

use crate::config::{Preferences, Validator};
use crate::device::Device;
use crate::error::DeviceError;

/// Configuration key for the first UID handed to an output.
pub const BASE_UID_KEY: &str = "base-uid";
/// Configuration key (multi-valued) for device file name prefixes.
pub const DEVICE_PREFIX_KEY: &str = "device-prefix";

const DEFAULT_BASE_UID: &str = "7a70:00000100";
const DEFAULT_DEVICE_PREFIX: &str = "i2cdev";
const DEFAULT_DEVICE_DIR: &str = "/dev";

/// Owns the configuration store, counters and all bus devices.
pub struct Plugin {
    prefs: Preferences,
    device_dir: PathBuf,
    stats: Arc<BusStats>,
    devices: Vec<Device>,
}

impl Plugin {
    /// Creates a plugin that enumerates devices under `/dev`.
    #[must_use]
    pub fn new(prefs: Preferences, stats: Arc<BusStats>) -> Self {
        Self {
            prefs,
            device_dir: PathBuf::from(DEFAULT_DEVICE_DIR),
            stats,
            devices: Vec::new(),
        }
    }

    /// Overrides the device directory (tests point this at a tempdir).
    #[must_use]
    pub fn with_device_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.device_dir = dir.into();
        self
    }

    /// Enumerates matching bus devices and starts one [`Device`] each.
    ///
    /// A device that fails to start is logged and skipped. An invalid
    /// configured base UID falls back to the default.
    pub fn start(&mut self) -> Result<(), DeviceError> {
        self.prefs
            .set_default(BASE_UID_KEY, &Validator::AnyString, DEFAULT_BASE_UID);
        if !self.prefs.has_key(DEVICE_PREFIX_KEY) {
            self.prefs.set(DEVICE_PREFIX_KEY, DEFAULT_DEVICE_PREFIX);
        }

        let uid_str = self.prefs.get(BASE_UID_KEY).unwrap_or(DEFAULT_BASE_UID);
        let base_uid = match Uid::from_str(uid_str) {
            Ok(uid) => uid,
            Err(err) => {
                warn!(uid = uid_str, error = %err, default = DEFAULT_BASE_UID, "invalid base UID");
                Uid::from_str(DEFAULT_BASE_UID)
                    .map_err(|err| DeviceError::ConfigInvalid(err.to_string()))?
            }
        };
        let mut uids = UidAllocator::new(base_uid);

        let prefixes = self.prefs.get_multiple(DEVICE_PREFIX_KEY).to_vec();
        let files = find_matching_files(&self.device_dir, &prefixes)?;

        for file in files {
            let path = file.to_string_lossy().into_owned();
            let mut device = Device::new(
                &mut self.prefs,
                &path,
                &mut uids,
                Arc::clone(&self.stats),
            );
            match device.start(&self.prefs) {
                Ok(()) => {
                    info!(device = device.name(), ports = device.port_count(), "bus device started");
                    self.devices.push(device);
                }
                Err(err) => {
                    warn!(device = %path, error = %err, "skipping bus device");
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [Device] {
        &mut self.devices
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<BusStats> {
        &self.stats
    }

    #[must_use]
    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    /// Shuts every device down, persisting its state, then saves the
    /// configuration store.
    pub fn stop(&mut self) -> Result<(), DeviceError> {
        for device in &mut self.devices {
            device.shutdown(&mut self.prefs);
        }
        self.devices.clear();
        self.prefs.save()
    }
}

/// Files in `dir` whose name starts with one of `prefixes`, sorted.
fn find_matching_files(dir: &Path, prefixes: &[String]) -> Result<Vec<PathBuf>, DeviceError> {
    let entries = std::fs::read_dir(dir).map_err(|source| DeviceError::EnumerateDevices {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if prefixes.iter().any(|prefix| name.starts_with(prefix.as_str())) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
