//! Per-device transfer counters.
//!
//! Counters are keyed by bus device path and exposed under well-known
//! variable names so the host can export them unchanged:
//! `i2c-writes[<device>]`, `i2c-write-errors[<device>]` and
//! `i2c-drops[<device>]`.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Variable name for the per-device write counter.
pub const WRITES_VAR: &str = "i2c-writes";
/// Variable name for the per-device write-error counter.
pub const WRITE_ERRORS_VAR: &str = "i2c-write-errors";
/// Variable name for the per-device overrun-drop counter.
pub const DROPS_VAR: &str = "i2c-drops";

/// Shared counter maps for one plugin instance.
///
/// Writers bump `writes`/`write-errors`; backends bump `drops`. Updates
/// are mutex-protected; readers only observe values.
#[derive(Debug, Default)]
pub struct BusStats {
    writes: Mutex<HashMap<String, u64>>,
    write_errors: Mutex<HashMap<String, u64>>,
    drops: Mutex<HashMap<String, u64>>,
}

impl BusStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates zeroed entries for `device` in all three maps.
    pub fn register_device(&self, device: &str) {
        self.writes.lock().entry(device.to_string()).or_insert(0);
        self.write_errors
            .lock()
            .entry(device.to_string())
            .or_insert(0);
        self.drops.lock().entry(device.to_string()).or_insert(0);
    }

    pub fn add_write(&self, device: &str) {
        *self.writes.lock().entry(device.to_string()).or_insert(0) += 1;
    }

    pub fn add_write_error(&self, device: &str) {
        *self
            .write_errors
            .lock()
            .entry(device.to_string())
            .or_insert(0) += 1;
    }

    pub fn add_drop(&self, device: &str) {
        *self.drops.lock().entry(device.to_string()).or_insert(0) += 1;
    }

    #[must_use]
    pub fn writes(&self, device: &str) -> u64 {
        self.writes.lock().get(device).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn write_errors(&self, device: &str) -> u64 {
        self.write_errors.lock().get(device).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn drops(&self, device: &str) -> u64 {
        self.drops.lock().get(device).copied().unwrap_or(0)
    }

    /// Snapshot of every counter, formatted `<var>[<device>]`, sorted.
    #[must_use]
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut out = Vec::new();
        for (var, map) in [
            (WRITES_VAR, &self.writes),
            (WRITE_ERRORS_VAR, &self.write_errors),
            (DROPS_VAR, &self.drops),
        ] {
            for (device, value) in map.lock().iter() {
                out.push((format!("{var}[{device}]"), *value));
            }
        }
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_device_reads_zero() {
        let stats = BusStats::new();
        assert_eq!(stats.writes("/dev/nope"), 0);
        assert_eq!(stats.drops("/dev/nope"), 0);
    }

    #[test]
    fn register_then_increment() {
        let stats = BusStats::new();
        stats.register_device("/dev/bus0");
        assert_eq!(stats.writes("/dev/bus0"), 0);

        stats.add_write("/dev/bus0");
        stats.add_write("/dev/bus0");
        stats.add_write_error("/dev/bus0");
        stats.add_drop("/dev/bus0");

        assert_eq!(stats.writes("/dev/bus0"), 2);
        assert_eq!(stats.write_errors("/dev/bus0"), 1);
        assert_eq!(stats.drops("/dev/bus0"), 1);
    }

    #[test]
    fn export_uses_wire_names() {
        let stats = BusStats::new();
        stats.register_device("/dev/bus0");
        stats.add_write("/dev/bus0");

        let exported = stats.export();
        assert!(exported.contains(&("i2c-writes[/dev/bus0]".to_string(), 1)));
        assert!(exported.contains(&("i2c-drops[/dev/bus0]".to_string(), 0)));
    }
}
