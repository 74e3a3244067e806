//! Personalities: the encoding modes an output can run in.
//!
//! A personality pairs a slot footprint (how many channels it consumes
//! from its start address) with a human-readable description and,
//! optionally, per-slot metadata for the slot-info parameter.

use crate::pack::LABEL_MAX_LEN;

/// Primary slot type for slot-info reporting.
pub const SLOT_TYPE_PRIMARY: u8 = 0x00;

/// Slot definition ids for slot-info reporting.
pub const SLOT_DEF_INTENSITY: u16 = 0x0001;
pub const SLOT_DEF_COLOR_ADD_RED: u16 = 0x0205;
pub const SLOT_DEF_COLOR_ADD_GREEN: u16 = 0x0206;
pub const SLOT_DEF_COLOR_ADD_BLUE: u16 = 0x0207;

/// Metadata for one slot of a personality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotData {
    /// Slot type (primary/secondary).
    pub slot_type: u8,
    /// Slot definition id.
    pub definition: u16,
    /// Default slot value.
    pub default_value: u8,
}

impl SlotData {
    /// A primary slot with the given definition and default value.
    #[must_use]
    pub fn primary(definition: u16, default_value: u8) -> Self {
        Self {
            slot_type: SLOT_TYPE_PRIMARY,
            definition,
            default_value,
        }
    }
}

/// One encoding mode: a footprint plus its description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Personality {
    footprint: u16,
    description: String,
    slot_data: Vec<SlotData>,
}

impl Personality {
    /// Creates a personality without slot metadata.
    ///
    /// The description is truncated to the label limit (32 bytes).
    #[must_use]
    pub fn new(footprint: u16, description: &str) -> Self {
        let mut description = description.to_string();
        description.truncate(LABEL_MAX_LEN);
        Self {
            footprint,
            description,
            slot_data: Vec::new(),
        }
    }

    /// Attaches per-slot metadata.
    #[must_use]
    pub fn with_slot_data(mut self, slot_data: Vec<SlotData>) -> Self {
        self.slot_data = slot_data;
        self
    }

    /// Number of slots this personality consumes.
    #[must_use]
    pub fn footprint(&self) -> u16 {
        self.footprint
    }

    /// Human-readable description, at most 32 bytes.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Per-slot metadata, possibly empty.
    #[must_use]
    pub fn slot_data(&self) -> &[SlotData] {
        &self.slot_data
    }
}

/// Owns an output's personality list and tracks the active one.
///
/// Personalities are addressed 1-based, matching their wire ids.
#[derive(Debug, Clone)]
pub struct PersonalityManager {
    personalities: Vec<Personality>,
    active: u8,
}

impl PersonalityManager {
    /// Creates a manager over a non-empty personality list.
    ///
    /// The first personality starts active.
    #[must_use]
    pub fn new(personalities: Vec<Personality>) -> Self {
        debug_assert!(!personalities.is_empty());
        Self {
            personalities,
            active: 1,
        }
    }

    /// Number of personalities.
    #[must_use]
    pub fn count(&self) -> u8 {
        self.personalities.len() as u8
    }

    /// The active personality number (1-based).
    #[must_use]
    pub fn active_number(&self) -> u8 {
        self.active
    }

    /// The active personality.
    #[must_use]
    pub fn active(&self) -> &Personality {
        &self.personalities[usize::from(self.active) - 1]
    }

    /// The active personality's footprint.
    #[must_use]
    pub fn active_footprint(&self) -> u16 {
        self.active().footprint()
    }

    /// Looks up a personality by its 1-based number.
    #[must_use]
    pub fn get(&self, number: u8) -> Option<&Personality> {
        if number == 0 {
            return None;
        }
        self.personalities.get(usize::from(number) - 1)
    }

    /// Activates personality `number`; false if out of range.
    pub fn set_active(&mut self, number: u8) -> bool {
        if self.get(number).is_none() {
            return false;
        }
        self.active = number;
        true
    }
}
