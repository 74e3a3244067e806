//! The hardware-multiplexed backend.
//!
//! Every logical output keeps a fully independent frame buffer. An
//! external demultiplexer routes the bus to one LED string at a time,
//! selected by driving GPIO lines with the output number: bit 0 of the
//! output id goes to the first configured pin, bit 1 to the second, and
//! so on. The select lines are driven immediately before the bus write so
//! they have settled by the time bytes appear on the wire.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex, MutexGuard};
use sysfs_gpio::{Direction, Pin};
use tracing::{debug, info, warn};

use super::{Backend, Checkout, CheckoutInner, OutputFrame};
use crate::error::BusError;
use crate::stats::BusStats;
use crate::writer::BusWriter;

/// Configuration for a [`HardwareBackend`].
///
/// The output count is `2 ^ gpio_pins.len()`; no pins means a single
/// output with no select lines to drive.
#[derive(Debug, Clone, Default)]
pub struct HardwareOptions {
    pub gpio_pins: Vec<u16>,
}

pub(crate) struct HwState {
    pub outputs: Vec<OutputFrame>,
    pub exit: bool,
}

struct HwShared {
    device_path: String,
    state: Mutex<HwState>,
    cond: Condvar,
    stats: Arc<BusStats>,
}

/// One frame buffer per output, external GPIO demultiplexer.
pub struct HardwareBackend {
    shared: Arc<HwShared>,
    gpio_pins: Vec<u16>,
    output_count: usize,
    writer: Mutex<Option<Box<dyn BusWriter + Send>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HardwareBackend {
    /// Creates the backend, taking ownership of the bus writer.
    #[must_use]
    pub fn new(
        options: HardwareOptions,
        writer: Box<dyn BusWriter + Send>,
        stats: Arc<BusStats>,
    ) -> Self {
        let output_count = 1usize << options.gpio_pins.len();
        let device_path = writer.device_path().to_string();
        let outputs = (0..output_count).map(|_| OutputFrame::default()).collect();
        Self {
            shared: Arc::new(HwShared {
                device_path,
                state: Mutex::new(HwState {
                    outputs,
                    exit: false,
                }),
                cond: Condvar::new(),
                stats,
            }),
            gpio_pins: options.gpio_pins,
            output_count,
            writer: Mutex::new(Some(writer)),
            handle: Mutex::new(None),
        }
    }
}

impl Backend for HardwareBackend {
    fn init(&self) -> Result<(), BusError> {
        let mut slot = self.writer.lock();
        let Some(mut writer) = slot.take() else {
            return Ok(());
        };

        if let Err(err) = writer.init() {
            *slot = Some(writer);
            return Err(err);
        }

        let pins = match acquire_gpio(&self.gpio_pins) {
            Ok(pins) => pins,
            Err(err) => {
                *slot = Some(writer);
                return Err(err);
            }
        };

        info!(
            device = %self.shared.device_path,
            outputs = self.output_count,
            "starting hardware backend"
        );

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("strand-writer".into())
            .spawn(move || run_writer(shared, writer, pins))
            .map_err(BusError::SpawnThread)?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn checkout(
        &self,
        output: usize,
        payload_size: usize,
        latch_size: usize,
    ) -> Option<Checkout<'_>> {
        let mut guard = self.shared.state.lock();
        if output >= guard.outputs.len() {
            return None;
        }
        guard.outputs[output].prepare(payload_size, latch_size);
        Some(Checkout {
            inner: CheckoutInner::Hardware {
                guard,
                cond: &self.shared.cond,
                stats: &self.shared.stats,
                device: &self.shared.device_path,
            },
            output,
        })
    }

    fn device_path(&self) -> &str {
        &self.shared.device_path
    }

    fn output_count(&self) -> usize {
        self.output_count
    }

    fn shutdown(&self) {
        self.shared.state.lock().exit = true;
        self.shared.cond.notify_all();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!(device = %self.shared.device_path, "bus writer thread panicked");
            }
        }
    }
}

impl Drop for HardwareBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_writer(shared: Arc<HwShared>, mut writer: Box<dyn BusWriter + Send>, pins: Vec<Pin>) {
    let mut levels: Vec<Option<bool>> = vec![None; pins.len()];
    let mut frame: Vec<u8> = Vec::new();

    let mut guard = shared.state.lock();
    loop {
        while !guard.exit && !guard.outputs.iter().any(|o| o.pending) {
            shared.cond.wait(&mut guard);
        }
        if guard.exit {
            break;
        }

        for output in 0..guard.outputs.len() {
            if !guard.outputs[output].pending {
                continue;
            }
            {
                let slot = &mut guard.outputs[output];
                slot.pending = false;
                frame.clear();
                frame.extend_from_slice(&slot.bytes);
            }
            MutexGuard::unlocked(&mut guard, || {
                select_output(&pins, &mut levels, output);
                if let Err(err) = writer.write(&frame) {
                    debug!(output, error = %err, "frame write failed");
                }
            });
        }
    }
    drop(guard);
    release_gpio(&pins);
}

/// Drives the select lines with the bits of `output`, skipping lines that
/// already carry the right level.
fn select_output(pins: &[Pin], levels: &mut [Option<bool>], output: usize) {
    for (bit, pin) in pins.iter().enumerate() {
        let level = (output >> bit) & 1 == 1;
        if levels[bit] == Some(level) {
            continue;
        }
        match pin.set_value(u8::from(level)) {
            Ok(()) => levels[bit] = Some(level),
            Err(err) => {
                warn!(pin = pin.get_pin_num(), error = %err, "failed to drive select line");
            }
        }
    }
}

fn acquire_gpio(pins: &[u16]) -> Result<Vec<Pin>, BusError> {
    let mut acquired = Vec::with_capacity(pins.len());
    for &number in pins {
        let pin = Pin::new(u64::from(number));
        let result = pin.export().and_then(|()| pin.set_direction(Direction::Out));
        match result {
            Ok(()) => acquired.push(pin),
            Err(source) => {
                release_gpio(&acquired);
                return Err(BusError::GpioAcquire {
                    pin: number,
                    source,
                });
            }
        }
    }
    Ok(acquired)
}

fn release_gpio(pins: &[Pin]) {
    for pin in pins {
        if let Err(err) = pin.unexport() {
            debug!(pin = pin.get_pin_num(), error = %err, "failed to release GPIO line");
        }
    }
}
