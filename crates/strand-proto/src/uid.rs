//! Remote-device identifiers.
//!
//! A [`Uid`] is the 6-byte identifier used to address an output as a
//! remote device: a 16-bit manufacturer id followed by a 32-bit device id.
//! The textual form is `mmmm:dddddddd` in lower-case hex, e.g.
//! `7a70:00000100`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error produced when parsing a [`Uid`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UidParseError {
    /// Missing the `:` separator between manufacturer and device id.
    #[error("UID '{0}' is missing the ':' separator")]
    MissingSeparator(String),

    /// One of the two components is not valid hex.
    #[error("UID '{0}' contains an invalid hex component")]
    InvalidHex(String),
}

/// A 6-byte remote-device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid {
    manufacturer: u16,
    device: u32,
}

impl Uid {
    /// Creates a UID from its two components.
    #[must_use]
    pub fn new(manufacturer: u16, device: u32) -> Self {
        Self {
            manufacturer,
            device,
        }
    }

    /// The 16-bit manufacturer id.
    #[must_use]
    pub fn manufacturer_id(&self) -> u16 {
        self.manufacturer
    }

    /// The 32-bit device id.
    #[must_use]
    pub fn device_id(&self) -> u32 {
        self.device
    }

    /// The wire representation: manufacturer (2 bytes) then device (4),
    /// both big-endian.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[..2].copy_from_slice(&self.manufacturer.to_be_bytes());
        out[2..].copy_from_slice(&self.device.to_be_bytes());
        out
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:08x}", self.manufacturer, self.device)
    }
}

impl FromStr for Uid {
    type Err = UidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (manufacturer, device) = s
            .split_once(':')
            .ok_or_else(|| UidParseError::MissingSeparator(s.to_string()))?;
        let manufacturer = u16::from_str_radix(manufacturer, 16)
            .map_err(|_| UidParseError::InvalidHex(s.to_string()))?;
        let device = u32::from_str_radix(device, 16)
            .map_err(|_| UidParseError::InvalidHex(s.to_string()))?;
        Ok(Self::new(manufacturer, device))
    }
}

/// Hands out consecutive UIDs starting from a base UID.
///
/// Allocation stays within the base manufacturer id and stops before the
/// all-devices broadcast id (`0xffffffff`).
#[derive(Debug, Clone)]
pub struct UidAllocator {
    next: Option<Uid>,
}

impl UidAllocator {
    /// Creates an allocator whose first UID is `base`.
    #[must_use]
    pub fn new(base: Uid) -> Self {
        Self { next: Some(base) }
    }

    /// Claims the next UID, or `None` once the device-id space is spent.
    pub fn allocate_next(&mut self) -> Option<Uid> {
        let current = self.next?;
        self.next = if current.device_id() == u32::MAX - 1 {
            None
        } else {
            Some(Uid::new(current.manufacturer_id(), current.device_id() + 1))
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips() {
        let uid = Uid::new(0x7a70, 0x0100);
        assert_eq!(uid.to_string(), "7a70:00000100");
        assert_eq!("7a70:00000100".parse::<Uid>().unwrap(), uid);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "7a700100".parse::<Uid>(),
            Err(UidParseError::MissingSeparator(_))
        ));
        assert!(matches!(
            "zz70:00000100".parse::<Uid>(),
            Err(UidParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn wire_bytes_are_big_endian() {
        let uid = Uid::new(0x7a70, 0x01020304);
        assert_eq!(uid.to_bytes(), [0x7a, 0x70, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn allocator_hands_out_consecutive_ids() {
        let mut alloc = UidAllocator::new(Uid::new(0x7a70, 0x0100));
        assert_eq!(alloc.allocate_next(), Some(Uid::new(0x7a70, 0x0100)));
        assert_eq!(alloc.allocate_next(), Some(Uid::new(0x7a70, 0x0101)));
    }

    #[test]
    fn allocator_stops_before_broadcast() {
        let mut alloc = UidAllocator::new(Uid::new(0x7a70, u32::MAX - 1));
        assert_eq!(alloc.allocate_next(), Some(Uid::new(0x7a70, u32::MAX - 1)));
        assert_eq!(alloc.allocate_next(), None);
    }
}
