//! Device layer of the strand LED output driver.
//!
//! Turns channel data from the lighting engine into wire bytes for
//! addressable LED strings (WS2801, LPD8806, P9813, APA102, APA102 with
//! per-pixel brightness) and exposes each string as a remote-controllable
//! device.
//!
//! # Structure
//!
//! - [`output`]: one LED string — the per-personality encoders plus the
//!   remote-device responder state and handler table
//! - [`device`]: one bus — binds a writer, a backend and its outputs
//! - [`plugin`]: enumerates buses and owns the devices
//! - [`config`]: the persisted key/value configuration store
//! - [`netinfo`]: host network facts for the E1.37-2 parameters
//!
//! Dataflow for a channel update:
//!
//! ```text
//! Device::write_slots(port, slots)
//!   -> PixelOutput::write_slots      (dropped while identify is on)
//!     -> personality encoder         (wire-format bytes)
//!       -> Backend::checkout / commit
//!         -> writer thread -> BusWriter::write
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod netinfo;
pub mod output;
pub mod plugin;

pub use config::{Preferences, Validator};
pub use device::Device;
pub use error::DeviceError;
pub use output::{personalities, PixelOutput, PixelOutputOptions};
pub use plugin::Plugin;

pub(crate) mod util {
    /// The trailing file name of a device path, or the path itself when
    /// it has no separator.
    pub fn filename_of(path: &str) -> String {
        std::path::Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string())
    }

}
