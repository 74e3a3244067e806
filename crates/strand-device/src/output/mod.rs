//! One logical output: wire-format encoding plus remote-device state.
//!
//! A [`PixelOutput`] takes channel updates for its slice of the universe
//! and turns them into wire bytes for the configured LED protocol,
//! handing the frame to its backend. It also carries the output-visible
//! remote-device state (personality, start address, labels, identify,
//! sensors) and answers parameter messages through a handler table (see
//! the `rdm` submodule).

mod rdm;

use std::sync::Arc;

use strand_bus::Backend;
use strand_proto::personality::{
    SlotData, SLOT_DEF_COLOR_ADD_BLUE, SLOT_DEF_COLOR_ADD_GREEN, SLOT_DEF_COLOR_ADD_RED,
    SLOT_DEF_INTENSITY,
};
use strand_proto::sensor::{load_average_available, LoadSensor, LoadWindow, Sensor};
use strand_proto::{
    ParamRequest, ParamResponse, Personality, PersonalityManager, SlotBuffer, Uid,
    MAX_SLOT_VALUE, UNIVERSE_SIZE,
};
use tracing::info;

use crate::netinfo::{NetworkInfo, SystemNetworkInfo};
use crate::util::filename_of;

/// Personality numbers, stable across releases: the integer form is what
/// gets stored in configuration files and shown to controllers.
pub mod personalities {
    pub const WS2801_INDIVIDUAL: u8 = 1;
    pub const WS2801_COMBINED: u8 = 2;
    pub const LPD8806_INDIVIDUAL: u8 = 3;
    pub const LPD8806_COMBINED: u8 = 4;
    pub const P9813_INDIVIDUAL: u8 = 5;
    pub const P9813_COMBINED: u8 = 6;
    pub const APA102_INDIVIDUAL: u8 = 7;
    pub const APA102_COMBINED: u8 = 8;
    pub const APA102_PB_INDIVIDUAL: u8 = 9;
    pub const APA102_PB_COMBINED: u8 = 10;
}

const WS2801_SLOTS_PER_PIXEL: usize = 3;
const LPD8806_SLOTS_PER_PIXEL: usize = 3;
const P9813_SLOTS_PER_PIXEL: usize = 3;
const APA102_SLOTS_PER_PIXEL: usize = 3;
const APA102_PB_SLOTS_PER_PIXEL: usize = 4;

// The P9813 and APA102 spend four bus bytes per pixel: a flag/brightness
// byte ahead of the three color bytes.
const P9813_BUS_BYTES_PER_PIXEL: usize = 4;
const APA102_BUS_BYTES_PER_PIXEL: usize = 4;

const APA102_START_FRAME_BYTES: usize = 4;
const APA102_LEDFRAME_START_MARK: u8 = 0xE0;

/// Construction options for a [`PixelOutput`].
#[derive(Debug, Clone)]
pub struct PixelOutputOptions {
    pub output_number: u8,
    pub device_label: String,
    pub pixel_count: u8,
}

impl PixelOutputOptions {
    /// Defaults for one output of `bus_name`: a 25-pixel string with a
    /// derived label.
    #[must_use]
    pub fn new(output_number: u8, bus_name: &str) -> Self {
        Self {
            output_number,
            device_label: format!("LED Device - {bus_name}"),
            pixel_count: 25,
        }
    }
}

/// One remote-controllable LED string on a backend output.
pub struct PixelOutput {
    backend: Arc<dyn Backend>,
    output_number: u8,
    bus_name: String,
    uid: Uid,
    pixel_count: u8,
    device_label: String,
    start_address: u16,
    identify_mode: bool,
    personalities: PersonalityManager,
    sensors: Vec<Box<dyn Sensor>>,
    network: Box<dyn NetworkInfo>,
}

impl PixelOutput {
    /// Creates an output bound to `backend`'s output `options.output_number`.
    #[must_use]
    pub fn new(uid: Uid, backend: Arc<dyn Backend>, options: PixelOutputOptions) -> Self {
        let bus_name = filename_of(backend.device_path());
        let pixels = usize::from(options.pixel_count);

        let rgb_slots = vec![
            SlotData::primary(SLOT_DEF_COLOR_ADD_RED, 0),
            SlotData::primary(SLOT_DEF_COLOR_ADD_GREEN, 0),
            SlotData::primary(SLOT_DEF_COLOR_ADD_BLUE, 0),
        ];
        let irgb_slots = {
            let mut slots = vec![SlotData::primary(SLOT_DEF_INTENSITY, MAX_SLOT_VALUE)];
            slots.extend_from_slice(&rgb_slots);
            slots
        };

        let personalities = PersonalityManager::new(vec![
            Personality::new(
                (pixels * WS2801_SLOTS_PER_PIXEL) as u16,
                "WS2801 Individual Control",
            ),
            Personality::new(WS2801_SLOTS_PER_PIXEL as u16, "WS2801 Combined Control")
                .with_slot_data(rgb_slots.clone()),
            Personality::new(
                (pixels * LPD8806_SLOTS_PER_PIXEL) as u16,
                "LPD8806 Individual Control",
            ),
            Personality::new(LPD8806_SLOTS_PER_PIXEL as u16, "LPD8806 Combined Control")
                .with_slot_data(rgb_slots.clone()),
            Personality::new(
                (pixels * P9813_SLOTS_PER_PIXEL) as u16,
                "P9813 Individual Control",
            ),
            Personality::new(P9813_SLOTS_PER_PIXEL as u16, "P9813 Combined Control")
                .with_slot_data(rgb_slots.clone()),
            Personality::new(
                (pixels * APA102_SLOTS_PER_PIXEL) as u16,
                "APA102 Individual Control",
            ),
            Personality::new(APA102_SLOTS_PER_PIXEL as u16, "APA102 Combined Control")
                .with_slot_data(rgb_slots),
            Personality::new(
                (pixels * APA102_PB_SLOTS_PER_PIXEL) as u16,
                "APA102 Pixel Brightness Individ.",
            ),
            Personality::new(
                APA102_PB_SLOTS_PER_PIXEL as u16,
                "APA102 Pixel Brightness Combined",
            )
            .with_slot_data(irgb_slots),
        ]);

        let sensors: Vec<Box<dyn Sensor>> = if load_average_available() {
            vec![
                Box::new(LoadSensor::new(LoadWindow::OneMinute, "Load Average 1 minute")),
                Box::new(LoadSensor::new(
                    LoadWindow::FiveMinutes,
                    "Load Average 5 minutes",
                )),
                Box::new(LoadSensor::new(
                    LoadWindow::FifteenMinutes,
                    "Load Average 15 minutes",
                )),
            ]
        } else {
            Vec::new()
        };

        Self {
            backend,
            output_number: options.output_number,
            bus_name,
            uid,
            pixel_count: options.pixel_count,
            device_label: options.device_label,
            start_address: 1,
            identify_mode: false,
            personalities,
            sensors,
            network: Box::new(SystemNetworkInfo::new()),
        }
    }

    /// Replaces the network information source (tests, embedded hosts).
    #[must_use]
    pub fn with_network_info(mut self, network: Box<dyn NetworkInfo>) -> Self {
        self.network = network;
        self
    }

    #[must_use]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    #[must_use]
    pub fn output_number(&self) -> u8 {
        self.output_number
    }

    #[must_use]
    pub fn pixel_count(&self) -> u8 {
        self.pixel_count
    }

    #[must_use]
    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    pub fn set_device_label(&mut self, label: &str) {
        self.device_label = label.to_string();
    }

    #[must_use]
    pub fn personality(&self) -> u8 {
        self.personalities.active_number()
    }

    /// Activates a personality.
    ///
    /// If the new footprint no longer fits behind the current start
    /// address, the start address is pulled down to the highest address
    /// that keeps the footprint inside the universe. A personality with a
    /// zero footprint is refused.
    pub fn set_personality(&mut self, personality: u16) -> bool {
        let Ok(number) = u8::try_from(personality) else {
            return false;
        };
        let Some(footprint) = self.personalities.get(number).map(Personality::footprint) else {
            return false;
        };
        if footprint == 0 {
            return false;
        }
        self.personalities.set_active(number);
        let max_start = (UNIVERSE_SIZE as i32 - i32::from(footprint) + 1).max(1) as u16;
        if self.start_address > max_start {
            self.start_address = max_start;
        }
        true
    }

    #[must_use]
    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    /// Moves the start address; refused unless the whole footprint stays
    /// inside the universe.
    pub fn set_start_address(&mut self, address: u16) -> bool {
        let footprint = i32::from(self.personalities.active_footprint());
        let end = UNIVERSE_SIZE as i32 - footprint + 1;
        if footprint == 0 || address == 0 || i32::from(address) > end {
            return false;
        }
        self.start_address = address;
        true
    }

    #[must_use]
    pub fn identify_mode(&self) -> bool {
        self.identify_mode
    }

    /// Toggles identify: on paints the whole string full-on, off blacks
    /// it out, both through the active personality's encoder.
    pub fn set_identify(&mut self, on: bool) {
        if self.identify_mode == on {
            return;
        }
        self.identify_mode = on;
        info!(
            device = %self.bus_name,
            output = self.output_number,
            identify = on,
            "identify mode changed"
        );
        let frame = if on {
            SlotBuffer::filled(MAX_SLOT_VALUE)
        } else {
            SlotBuffer::blackout()
        };
        self.internal_write(&frame);
    }

    #[must_use]
    pub fn sensor_count(&self) -> u8 {
        self.sensors.len() as u8
    }

    /// `"Output <n>, <personality>, <footprint> slots @ <address>. (<uid>)"`
    #[must_use]
    pub fn description(&self) -> String {
        format!(
            "Output {}, {}, {} slots @ {}. ({})",
            self.output_number,
            self.personalities.active().description(),
            self.personalities.active_footprint(),
            self.start_address,
            self.uid
        )
    }

    /// Channel-update entry point. Updates are dropped while identify is
    /// on so the identify frame stays visible.
    pub fn write_slots(&mut self, slots: &SlotBuffer) {
        if self.identify_mode {
            return;
        }
        self.internal_write(slots);
    }

    /// Dispatches a parameter message through the handler table.
    pub fn handle_request(&mut self, request: &ParamRequest) -> ParamResponse {
        rdm::dispatch(self, request)
    }

    fn internal_write(&mut self, slots: &SlotBuffer) {
        match self.personalities.active_number() {
            personalities::WS2801_INDIVIDUAL => self.individual_ws2801(slots),
            personalities::WS2801_COMBINED => self.combined_ws2801(slots),
            personalities::LPD8806_INDIVIDUAL => self.individual_lpd8806(slots),
            personalities::LPD8806_COMBINED => self.combined_lpd8806(slots),
            personalities::P9813_INDIVIDUAL => self.individual_p9813(slots),
            personalities::P9813_COMBINED => self.combined_p9813(slots),
            personalities::APA102_INDIVIDUAL => self.individual_apa102(slots),
            personalities::APA102_COMBINED => self.combined_apa102(slots),
            personalities::APA102_PB_INDIVIDUAL => self.individual_apa102_pb(slots),
            personalities::APA102_PB_COMBINED => self.combined_apa102_pb(slots),
            _ => {}
        }
    }

    fn first_slot(&self) -> usize {
        usize::from(self.start_address) - 1
    }

    fn pixels(&self) -> usize {
        usize::from(self.pixel_count)
    }

    fn insufficient_data(&self, required: usize, got: usize) {
        info!(
            device = %self.bus_name,
            output = self.output_number,
            required,
            got,
            "insufficient channel data, dropping update"
        );
    }

    // The whole string length is always checked out, even when only part
    // of it has fresh data; unwritten bytes keep the previous frame's
    // contents because the per-output buffer persists.

    fn individual_ws2801(&mut self, slots: &SlotBuffer) {
        let output_length = self.pixels() * WS2801_SLOTS_PER_PIXEL;
        let output = usize::from(self.output_number);
        let Some(mut frame) = self.backend.checkout(output, output_length, 0) else {
            return;
        };
        slots.copy_range(self.first_slot(), &mut frame[..output_length]);
        frame.commit();
    }

    fn combined_ws2801(&mut self, slots: &SlotBuffer) {
        let mut pixel = [0u8; WS2801_SLOTS_PER_PIXEL];
        let copied = slots.copy_range(self.first_slot(), &mut pixel);
        if copied != WS2801_SLOTS_PER_PIXEL {
            self.insufficient_data(WS2801_SLOTS_PER_PIXEL, copied);
            return;
        }

        let output_length = self.pixels() * WS2801_SLOTS_PER_PIXEL;
        let output = usize::from(self.output_number);
        let Some(mut frame) = self.backend.checkout(output, output_length, 0) else {
            return;
        };
        for chunk in frame[..output_length].chunks_exact_mut(WS2801_SLOTS_PER_PIXEL) {
            chunk.copy_from_slice(&pixel);
        }
        frame.commit();
    }

    fn individual_lpd8806(&mut self, slots: &SlotBuffer) {
        let latch_bytes = (self.pixels() + 31) / 32;
        let first = self.first_slot();
        let avail = slots.available_from(first);
        if avail < LPD8806_SLOTS_PER_PIXEL {
            self.insufficient_data(LPD8806_SLOTS_PER_PIXEL, avail);
            return;
        }

        let output_length = self.pixels() * LPD8806_SLOTS_PER_PIXEL;
        let output = usize::from(self.output_number);
        let Some(mut frame) = self.backend.checkout(output, output_length, latch_bytes) else {
            return;
        };

        let span = output_length.min(avail);
        for i in 0..span / LPD8806_SLOTS_PER_PIXEL {
            let offset = first + i * LPD8806_SLOTS_PER_PIXEL;
            let (r, g, b) = (slots.get(offset), slots.get(offset + 1), slots.get(offset + 2));
            // The LPD8806 wants GRB with the high bit set and 7-bit color.
            frame[i * LPD8806_SLOTS_PER_PIXEL] = 0x80 | (g >> 1);
            frame[i * LPD8806_SLOTS_PER_PIXEL + 1] = 0x80 | (r >> 1);
            frame[i * LPD8806_SLOTS_PER_PIXEL + 2] = 0x80 | (b >> 1);
        }
        frame.commit();
    }

    fn combined_lpd8806(&mut self, slots: &SlotBuffer) {
        let latch_bytes = (self.pixels() + 31) / 32;
        let mut pixel = [0u8; LPD8806_SLOTS_PER_PIXEL];
        let copied = slots.copy_range(self.first_slot(), &mut pixel);
        if copied != LPD8806_SLOTS_PER_PIXEL {
            self.insufficient_data(LPD8806_SLOTS_PER_PIXEL, copied);
            return;
        }
        pixel.swap(0, 1);

        let output_length = self.pixels() * LPD8806_SLOTS_PER_PIXEL;
        let output = usize::from(self.output_number);
        let Some(mut frame) = self.backend.checkout(output, output_length, latch_bytes) else {
            return;
        };
        for chunk in frame[..output_length].chunks_exact_mut(LPD8806_SLOTS_PER_PIXEL) {
            for (dest, src) in chunk.iter_mut().zip(pixel.iter()) {
                *dest = 0x80 | (src >> 1);
            }
        }
        frame.commit();
    }

    fn individual_p9813(&mut self, slots: &SlotBuffer) {
        // Three zero pixel-frames latch the string; the first pixel slot
        // of the payload stays zero and acts as the start-of-frame
        // delimiter, so pixel data begins one bus pixel in.
        let latch_bytes = 3 * P9813_BUS_BYTES_PER_PIXEL;
        let first = self.first_slot();
        let avail = slots.available_from(first);
        if avail < P9813_SLOTS_PER_PIXEL {
            self.insufficient_data(P9813_SLOTS_PER_PIXEL, avail);
            return;
        }

        let output_length = self.pixels() * P9813_BUS_BYTES_PER_PIXEL;
        let output = usize::from(self.output_number);
        let Some(mut frame) = self.backend.checkout(output, output_length, latch_bytes) else {
            return;
        };

        for i in 0..self.pixels() {
            let offset = first + i * P9813_SLOTS_PER_PIXEL;
            let bus_offset = (i + 1) * P9813_BUS_BYTES_PER_PIXEL;
            let (r, g, b) = if slots.available_from(offset) >= P9813_SLOTS_PER_PIXEL {
                (slots.get(offset), slots.get(offset + 1), slots.get(offset + 2))
            } else {
                (0, 0, 0)
            };
            frame[bus_offset] = p9813_flag(r, g, b);
            frame[bus_offset + 1] = b;
            frame[bus_offset + 2] = g;
            frame[bus_offset + 3] = r;
        }
        frame.commit();
    }

    fn combined_p9813(&mut self, slots: &SlotBuffer) {
        let latch_bytes = 3 * P9813_BUS_BYTES_PER_PIXEL;
        let mut color = [0u8; P9813_SLOTS_PER_PIXEL];
        let copied = slots.copy_range(self.first_slot(), &mut color);
        if copied != P9813_SLOTS_PER_PIXEL {
            self.insufficient_data(P9813_SLOTS_PER_PIXEL, copied);
            return;
        }
        let (r, g, b) = (color[0], color[1], color[2]);
        let pixel = [p9813_flag(r, g, b), b, g, r];

        let output_length = self.pixels() * P9813_BUS_BYTES_PER_PIXEL;
        let output = usize::from(self.output_number);
        let Some(mut frame) = self.backend.checkout(output, output_length, latch_bytes) else {
            return;
        };
        for i in 0..self.pixels() {
            let bus_offset = (i + 1) * P9813_BUS_BYTES_PER_PIXEL;
            frame[bus_offset..bus_offset + P9813_BUS_BYTES_PER_PIXEL].copy_from_slice(&pixel);
        }
        frame.commit();
    }

    fn individual_apa102(&mut self, slots: &SlotBuffer) {
        let first = self.first_slot();
        let avail = slots.available_from(first);
        if avail < APA102_SLOTS_PER_PIXEL {
            self.insufficient_data(APA102_SLOTS_PER_PIXEL, avail);
            return;
        }

        let mut output_length = self.pixels() * APA102_BUS_BYTES_PER_PIXEL;
        // Only the first output carries the shared start-frame; on a
        // software backend the outputs concatenate into one bus frame
        // which must begin with exactly one start-frame.
        if self.output_number == 0 {
            output_length += APA102_START_FRAME_BYTES;
        }
        let output = usize::from(self.output_number);
        let Some(mut frame) =
            self.backend
                .checkout(output, output_length, apa102_latch_bytes(self.pixels()))
        else {
            return;
        };

        let base = if self.output_number == 0 {
            frame[..APA102_START_FRAME_BYTES].fill(0);
            APA102_START_FRAME_BYTES
        } else {
            0
        };

        for i in 0..self.pixels() {
            let offset = first + i * APA102_SLOTS_PER_PIXEL;
            let bus_offset = base + i * APA102_BUS_BYTES_PER_PIXEL;
            // Start mark (111) plus full global brightness; a fixed
            // brightness keeps the strings from flickering.
            frame[bus_offset] = 0xFF;
            if slots.available_from(offset) >= APA102_SLOTS_PER_PIXEL {
                frame[bus_offset + 1] = slots.get(offset + 2); // blue
                frame[bus_offset + 2] = slots.get(offset + 1); // green
                frame[bus_offset + 3] = slots.get(offset); // red
            }
        }
        frame.commit();
    }

    fn individual_apa102_pb(&mut self, slots: &SlotBuffer) {
        let first = self.first_slot();
        let avail = slots.available_from(first);
        if avail < APA102_PB_SLOTS_PER_PIXEL {
            self.insufficient_data(APA102_PB_SLOTS_PER_PIXEL, avail);
            return;
        }

        let mut output_length = self.pixels() * APA102_BUS_BYTES_PER_PIXEL;
        if self.output_number == 0 {
            output_length += APA102_START_FRAME_BYTES;
        }
        let output = usize::from(self.output_number);
        let Some(mut frame) =
            self.backend
                .checkout(output, output_length, apa102_latch_bytes(self.pixels()))
        else {
            return;
        };

        let base = if self.output_number == 0 {
            frame[..APA102_START_FRAME_BYTES].fill(0);
            APA102_START_FRAME_BYTES
        } else {
            0
        };

        for i in 0..self.pixels() {
            let offset = first + i * APA102_PB_SLOTS_PER_PIXEL;
            let bus_offset = base + i * APA102_BUS_BYTES_PER_PIXEL;
            // Pixels without complete data are skipped entirely and keep
            // their previous bytes.
            if slots.available_from(offset) >= APA102_PB_SLOTS_PER_PIXEL {
                frame[bus_offset] =
                    APA102_LEDFRAME_START_MARK | apa102_pixel_brightness(slots.get(offset));
                frame[bus_offset + 1] = slots.get(offset + 3); // blue
                frame[bus_offset + 2] = slots.get(offset + 2); // green
                frame[bus_offset + 3] = slots.get(offset + 1); // red
            }
        }
        frame.commit();
    }

    fn combined_apa102(&mut self, slots: &SlotBuffer) {
        let first = self.first_slot();
        let avail = slots.available_from(first);
        if avail < APA102_SLOTS_PER_PIXEL {
            self.insufficient_data(APA102_SLOTS_PER_PIXEL, avail);
            return;
        }

        let pixel = [
            0xFF,
            slots.get(first + 2), // blue
            slots.get(first + 1), // green
            slots.get(first),     // red
        ];
        self.replicate_apa102(&pixel);
    }

    fn combined_apa102_pb(&mut self, slots: &SlotBuffer) {
        let first = self.first_slot();
        let avail = slots.available_from(first);
        if avail < APA102_PB_SLOTS_PER_PIXEL {
            self.insufficient_data(APA102_PB_SLOTS_PER_PIXEL, avail);
            return;
        }

        let pixel = [
            APA102_LEDFRAME_START_MARK | apa102_pixel_brightness(slots.get(first)),
            slots.get(first + 3), // blue
            slots.get(first + 2), // green
            slots.get(first + 1), // red
        ];
        self.replicate_apa102(&pixel);
    }

    fn replicate_apa102(&mut self, pixel: &[u8; APA102_BUS_BYTES_PER_PIXEL]) {
        let mut output_length = self.pixels() * APA102_BUS_BYTES_PER_PIXEL;
        if self.output_number == 0 {
            output_length += APA102_START_FRAME_BYTES;
        }
        let output = usize::from(self.output_number);
        let Some(mut frame) =
            self.backend
                .checkout(output, output_length, apa102_latch_bytes(self.pixels()))
        else {
            return;
        };

        let base = if self.output_number == 0 {
            frame[..APA102_START_FRAME_BYTES].fill(0);
            APA102_START_FRAME_BYTES
        } else {
            0
        };
        for i in 0..self.pixels() {
            let bus_offset = base + i * APA102_BUS_BYTES_PER_PIXEL;
            frame[bus_offset..bus_offset + APA102_BUS_BYTES_PER_PIXEL].copy_from_slice(pixel);
        }
        frame.commit();
    }
}

/// The P9813 flag byte: the bit-inverted concatenation of each channel's
/// two high bits.
fn p9813_flag(red: u8, green: u8, blue: u8) -> u8 {
    let mut flag = (red & 0xC0) >> 6;
    flag |= (green & 0xC0) >> 4;
    flag |= (blue & 0xC0) >> 2;
    !flag
}

/// End-frame length for an APA102 string: at least one clock edge per two
/// pixels, rounded up to whole bytes.
fn apa102_latch_bytes(pixel_count: usize) -> usize {
    let latch_bits = (pixel_count + 1) / 2;
    (latch_bits + 7) / 8
}

/// Maps 8-bit slot brightness onto the 5-bit pixel brightness field.
fn apa102_pixel_brightness(brightness: u8) -> u8 {
    brightness >> 3
}
