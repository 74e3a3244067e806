//! Wire-format encoding per personality, checked byte-for-byte against a
//! recording backend, plus the output-state invariants around start
//! address, personality changes and identify mode.

use std::sync::Arc;

use strand_bus::testing::FakeBackend;
use strand_bus::Backend;
use strand_device::{personalities, PixelOutput, PixelOutputOptions};
use strand_proto::{SlotBuffer, Uid};

fn make_output(pixel_count: u8, backend_outputs: usize, output_number: u8) -> (Arc<FakeBackend>, PixelOutput) {
    let backend = Arc::new(FakeBackend::new(backend_outputs));
    let mut options = PixelOutputOptions::new(output_number, "testbus");
    options.pixel_count = pixel_count;
    let output = PixelOutput::new(
        Uid::new(0x7a70, 0x0100),
        Arc::clone(&backend) as Arc<dyn Backend>,
        options,
    );
    (backend, output)
}

#[test]
fn ws2801_individual_copies_slots() {
    let (backend, mut output) = make_output(2, 1, 0);

    output.write_slots(&SlotBuffer::from_slice(&[1, 2, 3, 4, 5, 6]));
    assert_eq!(backend.commits(0), 1);
    assert_eq!(backend.committed(0), [1, 2, 3, 4, 5, 6]);

    // A shorter universe updates only the head; the rest of the frame
    // keeps the previous pixels.
    output.write_slots(&SlotBuffer::from_slice(&[9, 9]));
    assert_eq!(backend.commits(0), 2);
    assert_eq!(backend.committed(0), [9, 9, 3, 4, 5, 6]);
}

#[test]
fn ws2801_individual_honors_start_address() {
    let (backend, mut output) = make_output(1, 1, 0);
    assert!(output.set_start_address(3));

    output.write_slots(&SlotBuffer::from_slice(&[1, 2, 30, 40, 50]));
    assert_eq!(backend.committed(0), [30, 40, 50]);
}

#[test]
fn ws2801_combined_replicates_one_pixel() {
    let (backend, mut output) = make_output(3, 1, 0);
    assert!(output.set_personality(personalities::WS2801_COMBINED.into()));

    output.write_slots(&SlotBuffer::from_slice(&[7, 8, 9]));
    assert_eq!(backend.committed(0), [7, 8, 9, 7, 8, 9, 7, 8, 9]);
}

#[test]
fn ws2801_combined_needs_a_full_pixel() {
    let (backend, mut output) = make_output(3, 1, 0);
    assert!(output.set_personality(personalities::WS2801_COMBINED.into()));

    output.write_slots(&SlotBuffer::from_slice(&[7, 8]));
    assert_eq!(backend.commits(0), 0);
}

#[test]
fn lpd8806_individual_encodes_grb_with_high_bit() {
    let (backend, mut output) = make_output(2, 1, 0);
    assert!(output.set_personality(personalities::LPD8806_INDIVIDUAL.into()));

    output.write_slots(&SlotBuffer::from_slice(&[0xFF, 0x00, 0x80, 2, 4, 6]));
    assert_eq!(backend.commits(0), 1);
    assert_eq!(
        backend.committed(0),
        [
            0x80, 0xFF, 0xC0, // g, r, b of pixel 0
            0x82, 0x81, 0x83, // g, r, b of pixel 1
            0x00, // latch
        ]
    );
}

#[test]
fn lpd8806_combined_replicates_grb() {
    let (backend, mut output) = make_output(2, 1, 0);
    assert!(output.set_personality(personalities::LPD8806_COMBINED.into()));

    output.write_slots(&SlotBuffer::from_slice(&[0xFF, 0x00, 0x80]));
    assert_eq!(
        backend.committed(0),
        [0x80, 0xFF, 0xC0, 0x80, 0xFF, 0xC0, 0x00]
    );
}

#[test]
fn p9813_individual_layout_and_flag() {
    let (backend, mut output) = make_output(1, 1, 0);
    assert!(output.set_personality(personalities::P9813_INDIVIDUAL.into()));

    output.write_slots(&SlotBuffer::from_slice(&[0xC0, 0x80, 0x40]));
    let frame = backend.committed(0);
    // 4-byte payload plus 12 latch bytes; the first pixel slot stays zero
    // as the start-of-frame delimiter and pixel data begins one bus pixel
    // in, spilling into the head of the latch region.
    assert_eq!(frame.len(), 16);
    assert_eq!(&frame[..4], &[0, 0, 0, 0]);
    assert_eq!(&frame[4..8], &[0xE4, 0x40, 0x80, 0xC0]);
    assert_eq!(&frame[8..], &[0; 8]);
}

#[test]
fn p9813_combined_replicates_pixel_frames() {
    let (backend, mut output) = make_output(2, 1, 0);
    assert!(output.set_personality(personalities::P9813_COMBINED.into()));

    output.write_slots(&SlotBuffer::from_slice(&[0xC0, 0x80, 0x40]));
    let frame = backend.committed(0);
    assert_eq!(frame.len(), 8 + 12);
    assert_eq!(&frame[..4], &[0, 0, 0, 0]);
    assert_eq!(&frame[4..8], &[0xE4, 0x40, 0x80, 0xC0]);
    assert_eq!(&frame[8..12], &[0xE4, 0x40, 0x80, 0xC0]);
    assert_eq!(&frame[12..], &[0; 8]);
}

#[test]
fn apa102_individual_layout_on_first_output() {
    let (backend, mut output) = make_output(4, 1, 0);
    assert!(output.set_personality(personalities::APA102_INDIVIDUAL.into()));

    output.write_slots(&SlotBuffer::from_slice(&[10, 20, 30]));
    let frame = backend.committed(0);
    // 4 start-frame bytes + 4 pixels * 4 bytes + 1 latch byte.
    assert_eq!(frame.len(), 21);
    assert_eq!(&frame[..4], &[0, 0, 0, 0]);
    assert_eq!(&frame[4..8], &[0xFF, 30, 20, 10]);
    // Pixels without data still get their start mark.
    for pixel in 1..4 {
        let offset = 4 + pixel * 4;
        assert_eq!(frame[offset], 0xFF, "pixel {pixel}");
        assert_eq!(&frame[offset + 1..offset + 4], &[0, 0, 0]);
    }
    assert_eq!(frame[20], 0);
}

#[test]
fn apa102_individual_skips_start_frame_on_other_outputs() {
    let (backend, mut output) = make_output(2, 2, 1);
    assert!(output.set_personality(personalities::APA102_INDIVIDUAL.into()));

    output.write_slots(&SlotBuffer::from_slice(&[10, 20, 30, 40, 50, 60]));
    let frame = backend.committed(1);
    assert_eq!(frame.len(), 9);
    assert_eq!(&frame[..4], &[0xFF, 30, 20, 10]);
    assert_eq!(&frame[4..8], &[0xFF, 60, 50, 40]);
}

#[test]
fn apa102_combined_replicates_pixel() {
    let (backend, mut output) = make_output(2, 1, 0);
    assert!(output.set_personality(personalities::APA102_COMBINED.into()));

    output.write_slots(&SlotBuffer::from_slice(&[10, 20, 30]));
    let frame = backend.committed(0);
    assert_eq!(&frame[..4], &[0, 0, 0, 0]);
    assert_eq!(&frame[4..8], &[0xFF, 30, 20, 10]);
    assert_eq!(&frame[8..12], &[0xFF, 30, 20, 10]);
}

#[test]
fn apa102_pb_individual_encodes_brightness() {
    let (backend, mut output) = make_output(1, 1, 0);
    assert!(output.set_personality(personalities::APA102_PB_INDIVIDUAL.into()));

    output.write_slots(&SlotBuffer::from_slice(&[0xFF, 1, 2, 3]));
    let frame = backend.committed(0);
    assert_eq!(frame.len(), 9);
    assert_eq!(&frame[..4], &[0, 0, 0, 0]);
    // 0xE0 start mark | (0xFF >> 3) brightness, then blue, green, red.
    assert_eq!(&frame[4..8], &[0xFF, 3, 2, 1]);
}

#[test]
fn apa102_pb_needs_four_slots() {
    let (backend, mut output) = make_output(1, 1, 0);
    assert!(output.set_personality(personalities::APA102_PB_INDIVIDUAL.into()));

    output.write_slots(&SlotBuffer::from_slice(&[0xFF, 1, 2]));
    assert_eq!(backend.commits(0), 0);
}

#[test]
fn apa102_pb_combined_replicates_with_brightness() {
    let (backend, mut output) = make_output(2, 1, 0);
    assert!(output.set_personality(personalities::APA102_PB_COMBINED.into()));

    output.write_slots(&SlotBuffer::from_slice(&[0x80, 1, 2, 3]));
    let frame = backend.committed(0);
    assert_eq!(&frame[4..8], &[0xF0, 3, 2, 1]);
    assert_eq!(&frame[8..12], &[0xF0, 3, 2, 1]);
}

#[test]
fn insufficient_data_drops_the_update() {
    let (backend, mut output) = make_output(4, 1, 0);
    assert!(output.set_personality(personalities::APA102_INDIVIDUAL.into()));

    output.write_slots(&SlotBuffer::new());
    assert_eq!(backend.commits(0), 0);
}

#[test]
fn unknown_backend_output_is_a_silent_drop() {
    let (backend, mut output) = make_output(1, 1, 3);

    output.write_slots(&SlotBuffer::from_slice(&[1, 2, 3]));
    assert_eq!(backend.commits(0), 0);
}

#[test]
fn identify_paints_full_on_then_blackout() {
    let (backend, mut output) = make_output(2, 1, 0);

    output.set_identify(true);
    assert_eq!(backend.commits(0), 1);
    assert_eq!(backend.committed(0), [255; 6]);

    // Channel updates are dropped while identify is on.
    output.write_slots(&SlotBuffer::from_slice(&[1, 2, 3, 4, 5, 6]));
    assert_eq!(backend.commits(0), 1);

    // Setting the same mode again writes nothing.
    output.set_identify(true);
    assert_eq!(backend.commits(0), 1);

    output.set_identify(false);
    assert_eq!(backend.commits(0), 2);
    assert_eq!(backend.committed(0), [0; 6]);
}

#[test]
fn start_address_bounds_follow_the_footprint() {
    // 170 pixels of WS2801 individual control: 510 slots, so only
    // addresses 1..=3 keep the footprint inside the universe.
    let (_backend, mut output) = make_output(170, 1, 0);

    assert!(output.set_start_address(1));
    assert!(output.set_start_address(3));
    assert!(!output.set_start_address(4));
    assert_eq!(output.start_address(), 3);
    assert!(!output.set_start_address(0));
}

#[test]
fn personality_change_clamps_start_address() {
    let (_backend, mut output) = make_output(2, 1, 0);

    // WS2801 individual: 6 slots, addresses up to 507.
    assert!(output.set_start_address(507));

    // APA102 per-pixel brightness individual: 8 slots; 507 no longer
    // fits and gets pulled down to 505.
    assert!(output.set_personality(personalities::APA102_PB_INDIVIDUAL.into()));
    assert_eq!(output.personality(), personalities::APA102_PB_INDIVIDUAL);
    assert_eq!(output.start_address(), 505);
}

#[test]
fn zero_footprint_personality_is_refused() {
    let (_backend, mut output) = make_output(0, 1, 0);
    // With no pixels every individual personality has a zero footprint.
    assert!(!output.set_personality(personalities::WS2801_INDIVIDUAL.into()));
    assert!(!output.set_start_address(1));
}

#[test]
fn description_names_the_output() {
    let (_backend, output) = make_output(25, 1, 0);
    let description = output.description();
    assert_eq!(
        description,
        "Output 0, WS2801 Individual Control, 75 slots @ 1. (7a70:00000100)"
    );
}
