//! Protocol-level types shared across the strand driver.
//!
//! This crate is the bottom layer of the workspace and has no knowledge of
//! buses or backends. It provides:
//!
//! - [`SlotBuffer`]: up to one universe (512 slots) of channel data
//! - [`Uid`] / [`UidAllocator`]: 6-byte remote-device identifiers
//! - [`ParamRequest`] / [`ParamResponse`]: pre-parsed remote-device
//!   parameter messages (the envelope codec lives in the host)
//! - [`Personality`] / [`PersonalityManager`]: encoding modes and their
//!   slot footprints
//! - [`sensor`]: sensor definitions and the load-average sensor
//!
//! # Crate layering
//!
//! ```text
//! strand-device   (outputs, responder, assembly)
//!       |
//! strand-bus      (writer, backends)
//!       |
//! strand-proto    (THIS CRATE)
//! ```

pub mod pack;
pub mod param;
pub mod personality;
pub mod sensor;
pub mod slots;
pub mod uid;

pub use param::{CommandClass, NackReason, ParamRequest, ParamResponse};
pub use personality::{Personality, PersonalityManager, SlotData};
pub use slots::{SlotBuffer, MAX_SLOT_VALUE, UNIVERSE_SIZE};
pub use uid::{Uid, UidAllocator, UidParseError};
