//! The bus writer: an opaque byte sink over a Linux SPI character device.
//!
//! A writer is wholly owned by its backend's writer thread after `init`,
//! so the trait requires no internal locking. [`SpiWriter`] is the real
//! implementation; [`crate::testing::FakeWriter`] stands in for tests.

use std::io::Write;
use std::sync::Arc;

use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use tracing::{info, warn};

use crate::error::BusError;
use crate::stats::BusStats;

/// Highest supported link speed in Hz.
pub const MAX_SPEED_HZ: u32 = 32_000_000;

const BITS_PER_WORD: u8 = 8;

/// A byte-oriented blocking sink onto one physical bus.
///
/// `write` must only ever be called from one thread at a time (the
/// backend's writer thread); implementations carry no locks of their own.
pub trait BusWriter: Send {
    /// Opens and configures the bus endpoint.
    fn init(&mut self) -> Result<(), BusError>;

    /// Issues a single transfer of `data`.
    ///
    /// Fails iff fewer bytes were accepted than requested. The per-device
    /// write counter is bumped on entry and the error counter on failure.
    fn write(&mut self, data: &[u8]) -> Result<(), BusError>;

    /// The device path this writer was created for.
    fn device_path(&self) -> &str;
}

/// Link configuration for a [`SpiWriter`].
#[derive(Debug, Clone, Copy)]
pub struct SpiWriterOptions {
    /// Link speed in Hz.
    pub speed_hz: u32,
    /// Chip-select active-high polarity.
    pub cs_high: bool,
}

impl Default for SpiWriterOptions {
    fn default() -> Self {
        Self {
            speed_hz: 1_000_000,
            cs_high: false,
        }
    }
}

/// Writes frames to a `/dev/spidev*`-style character device.
pub struct SpiWriter {
    device_path: String,
    options: SpiWriterOptions,
    spi: Option<Spidev>,
    stats: Arc<BusStats>,
}

impl SpiWriter {
    /// Creates a writer for `device_path`; the device is opened by `init`.
    #[must_use]
    pub fn new(device_path: &str, options: SpiWriterOptions, stats: Arc<BusStats>) -> Self {
        info!(
            device = device_path,
            speed_hz = options.speed_hz,
            cs_high = options.cs_high,
            "created bus writer"
        );
        stats.register_device(device_path);
        Self {
            device_path: device_path.to_string(),
            options,
            spi: None,
            stats,
        }
    }
}

impl BusWriter for SpiWriter {
    fn init(&mut self) -> Result<(), BusError> {
        let mut spi = Spidev::open(&self.device_path).map_err(|source| BusError::Open {
            path: self.device_path.clone(),
            source,
        })?;

        let mut mode = SpiModeFlags::SPI_MODE_0;
        if self.options.cs_high {
            mode |= SpiModeFlags::SPI_CS_HIGH;
        }
        let config = SpidevOptions::new()
            .bits_per_word(BITS_PER_WORD)
            .max_speed_hz(self.options.speed_hz)
            .mode(mode)
            .build();
        spi.configure(&config).map_err(|source| BusError::Configure {
            path: self.device_path.clone(),
            source,
        })?;

        self.spi = Some(spi);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), BusError> {
        self.stats.add_write(&self.device_path);

        let Some(spi) = self.spi.as_mut() else {
            self.stats.add_write_error(&self.device_path);
            return Err(BusError::NotInitialized {
                path: self.device_path.clone(),
            });
        };

        match spi.write(data) {
            Ok(written) if written == data.len() => Ok(()),
            Ok(written) => {
                warn!(
                    device = %self.device_path,
                    written,
                    expected = data.len(),
                    "short write to bus device"
                );
                self.stats.add_write_error(&self.device_path);
                Err(BusError::ShortWrite {
                    path: self.device_path.clone(),
                    written,
                    expected: data.len(),
                })
            }
            Err(source) => {
                warn!(device = %self.device_path, error = %source, "bus write failed");
                self.stats.add_write_error(&self.device_path);
                Err(BusError::Write {
                    path: self.device_path.clone(),
                    source,
                })
            }
        }
    }

    fn device_path(&self) -> &str {
        &self.device_path
    }
}
