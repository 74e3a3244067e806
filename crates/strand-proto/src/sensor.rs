//! Sensors reportable through the sensor parameters.
//!
//! The only concrete sensor is the host load average, surfaced the way
//! the sensor-value parameter expects: a signed 16-bit reading with a
//! centi prefix (load 1.25 reports as 125). Lowest/highest are tracked
//! across fetches and a recorded snapshot is kept for record-sensors.

use std::fs;
use std::path::Path;

/// Sensor type code for "other".
pub const SENSOR_TYPE_OTHER: u8 = 0x7F;
/// Unit code for "none".
pub const SENSOR_UNIT_NONE: u8 = 0x00;
/// Prefix code for centi (reading × 100).
pub const SENSOR_PREFIX_CENTI: u8 = 0x02;

/// Recorded-value support bitmask: snapshot plus lowest/highest tracking.
pub const SENSOR_RECORDED_SUPPORT: u8 = 0x03;

/// Static description of a sensor.
#[derive(Debug, Clone)]
pub struct SensorDef {
    pub kind: u8,
    pub unit: u8,
    pub prefix: u8,
    pub range: (i16, i16),
    pub normal: (i16, i16),
    pub description: String,
}

/// A snapshot of a sensor's readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorValues {
    pub present: i16,
    pub lowest: i16,
    pub highest: i16,
    pub recorded: i16,
}

/// A pollable sensor.
pub trait Sensor: Send {
    /// Static definition used for the sensor-definition parameter.
    fn definition(&self) -> &SensorDef;

    /// Takes a fresh reading, updating lowest/highest, and reports all
    /// current values.
    fn fetch(&mut self) -> SensorValues;

    /// Stores the present value as the recorded snapshot.
    fn record(&mut self);

    /// Resets lowest/highest/recorded to the present value.
    fn reset(&mut self);
}

/// Which load-average window a [`LoadSensor`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadWindow {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
}

impl LoadWindow {
    fn field_index(self) -> usize {
        match self {
            Self::OneMinute => 0,
            Self::FiveMinutes => 1,
            Self::FifteenMinutes => 2,
        }
    }
}

const LOADAVG_PATH: &str = "/proc/loadavg";

/// True when the host exposes a readable load average.
#[must_use]
pub fn load_average_available() -> bool {
    Path::new(LOADAVG_PATH).exists()
}

/// Host load average over one window, scaled by 100.
#[derive(Debug)]
pub struct LoadSensor {
    window: LoadWindow,
    def: SensorDef,
    present: i16,
    lowest: i16,
    highest: i16,
    recorded: i16,
}

impl LoadSensor {
    /// Creates a load sensor for `window`, described by `description`.
    #[must_use]
    pub fn new(window: LoadWindow, description: &str) -> Self {
        Self {
            window,
            def: SensorDef {
                kind: SENSOR_TYPE_OTHER,
                unit: SENSOR_UNIT_NONE,
                prefix: SENSOR_PREFIX_CENTI,
                range: (0, i16::MAX),
                normal: (0, i16::MAX),
                description: description.to_string(),
            },
            present: 0,
            lowest: i16::MAX,
            highest: 0,
            recorded: 0,
        }
    }

    fn read_load(&self) -> i16 {
        let contents = match fs::read_to_string(LOADAVG_PATH) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::debug!(error = %err, "failed to read load average");
                return 0;
            }
        };
        parse_loadavg(&contents, self.window).unwrap_or(0)
    }
}

/// Parses one window out of `/proc/loadavg` content, scaled by 100.
pub(crate) fn parse_loadavg(contents: &str, window: LoadWindow) -> Option<i16> {
    let field = contents.split_whitespace().nth(window.field_index())?;
    let load: f32 = field.parse().ok()?;
    Some((load * 100.0).min(f32::from(i16::MAX)) as i16)
}

impl Sensor for LoadSensor {
    fn definition(&self) -> &SensorDef {
        &self.def
    }

    fn fetch(&mut self) -> SensorValues {
        self.present = self.read_load();
        self.lowest = self.lowest.min(self.present);
        self.highest = self.highest.max(self.present);
        SensorValues {
            present: self.present,
            lowest: self.lowest,
            highest: self.highest,
            recorded: self.recorded,
        }
    }

    fn record(&mut self) {
        self.present = self.read_load();
        self.recorded = self.present;
    }

    fn reset(&mut self) {
        self.present = self.read_load();
        self.lowest = self.present;
        self.highest = self.present;
        self.recorded = self.present;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "0.52 1.25 2.00 2/1024 4242\n";

    #[test]
    fn parses_each_window() {
        assert_eq!(parse_loadavg(SAMPLE, LoadWindow::OneMinute), Some(52));
        assert_eq!(parse_loadavg(SAMPLE, LoadWindow::FiveMinutes), Some(125));
        assert_eq!(parse_loadavg(SAMPLE, LoadWindow::FifteenMinutes), Some(200));
    }

    #[test]
    fn rejects_malformed_content() {
        assert_eq!(parse_loadavg("", LoadWindow::OneMinute), None);
        assert_eq!(parse_loadavg("x y z", LoadWindow::OneMinute), None);
    }

    #[test]
    fn definition_reports_centi_prefix() {
        let sensor = LoadSensor::new(LoadWindow::OneMinute, "Load Average 1 minute");
        assert_eq!(sensor.definition().prefix, SENSOR_PREFIX_CENTI);
        assert_eq!(sensor.definition().kind, SENSOR_TYPE_OTHER);
    }
}
