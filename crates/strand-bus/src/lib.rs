//! Bus transport for the strand driver.
//!
//! One physical bus is driven by exactly one [`BusWriter`], and shared by
//! several logical outputs through a [`Backend`]. Producers hand frames to
//! the backend with [`Backend::checkout`] / [`Checkout::commit`]; a
//! dedicated writer thread drains committed frames onto the bus.
//!
//! # Architecture
//!
//! ```text
//! producer threads                    writer thread
//! ----------------                    -------------
//! checkout(output) ──► frame buffer
//! fill payload              |
//! commit ──► pending ───────┼───────► drain ──► BusWriter::write
//!            (overrun drops │                   (GPIO select first on
//!             counted)      │                    the hardware backend)
//! ```
//!
//! Two backends exist:
//!
//! - [`HardwareBackend`]: one frame buffer per output, an external
//!   demultiplexer selected over GPIO lines. `2^pins` outputs.
//! - [`SoftwareBackend`]: all outputs concatenated into one bus frame; a
//!   configurable sync output decides which commit triggers the transfer.
//!
//! Overruns are not errors: committing over an undrained frame replaces it
//! and bumps the per-device drop counter ([`BusStats`]).

pub mod backend;
pub mod error;
pub mod stats;
pub mod testing;
pub mod writer;

pub use backend::hardware::{HardwareBackend, HardwareOptions};
pub use backend::software::{SoftwareBackend, SoftwareOptions};
pub use backend::{Backend, Checkout};
pub use error::BusError;
pub use stats::BusStats;
pub use writer::{BusWriter, SpiWriter, SpiWriterOptions, MAX_SPEED_HZ};
