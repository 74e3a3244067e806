//! One bus device: a writer, a backend and the outputs that share them.
//!
//! A [`Device`] is built from the configuration store: the backend kind,
//! link settings and per-port options all come from `<bus>-...` keys. On
//! shutdown the mutable per-port state (label, personality, start
//! address, pixel count) is written back to the same store.

use std::sync::Arc;

use strand_bus::{
    Backend, BusStats, BusWriter, HardwareBackend, HardwareOptions, SoftwareBackend,
    SoftwareOptions, SpiWriter, SpiWriterOptions, MAX_SPEED_HZ,
};
use strand_proto::{ParamRequest, ParamResponse, SlotBuffer, UidAllocator};
use tracing::{info, warn};

use crate::config::{Preferences, Validator};
use crate::error::DeviceError;
use crate::output::{PixelOutput, PixelOutputOptions};
use crate::util::filename_of;

const HARDWARE_BACKEND: &str = "hardware";
const SOFTWARE_BACKEND: &str = "software";

const MAX_PORT_COUNT: u32 = 32;
const MAX_GPIO_PIN: u32 = 1023;
const DEFAULT_SPEED_HZ: u32 = 1_000_000;

/// A physical bus with its backend and logical outputs.
pub struct Device {
    name: String,
    device_path: String,
    backend: Arc<dyn Backend>,
    outputs: Vec<PixelOutput>,
}

impl Device {
    /// Creates a device over the real SPI writer for `device_path`.
    #[must_use]
    pub fn new(
        prefs: &mut Preferences,
        device_path: &str,
        uids: &mut UidAllocator,
        stats: Arc<BusStats>,
    ) -> Self {
        let name = filename_of(device_path);
        set_defaults(prefs, &name);
        let options = SpiWriterOptions {
            speed_hz: prefs
                .get(&speed_key(&name))
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SPEED_HZ),
            cs_high: prefs.get(&ce_key(&name)) == Some("true"),
        };
        let writer = SpiWriter::new(device_path, options, Arc::clone(&stats));
        Self::with_writer(prefs, device_path, uids, stats, Box::new(writer))
    }

    /// Creates a device over an arbitrary writer (tests use a fake).
    #[must_use]
    pub fn with_writer(
        prefs: &mut Preferences,
        device_path: &str,
        uids: &mut UidAllocator,
        stats: Arc<BusStats>,
        writer: Box<dyn BusWriter + Send>,
    ) -> Self {
        let name = filename_of(device_path);
        set_defaults(prefs, &name);

        let backend_type = prefs
            .get(&backend_key(&name))
            .unwrap_or(SOFTWARE_BACKEND)
            .to_string();
        let backend: Arc<dyn Backend> = if backend_type == HARDWARE_BACKEND {
            let options = hardware_options(prefs, &name);
            let backend = HardwareBackend::new(options, writer, Arc::clone(&stats));
            info!(device = %name, ports = backend.output_count(), "hardware backend");
            Arc::new(backend)
        } else {
            if backend_type != SOFTWARE_BACKEND {
                warn!(device = %name, backend = %backend_type, "unknown backend type, using software");
            }
            let options = software_options(prefs, &name);
            let backend = SoftwareBackend::new(options, writer, Arc::clone(&stats));
            info!(device = %name, ports = backend.output_count(), "software backend");
            Arc::new(backend)
        };

        let mut outputs = Vec::new();
        for port in 0..backend.output_count() {
            let port = port as u8;
            let mut options = PixelOutputOptions::new(port, &name);
            if let Some(label) = prefs.get(&device_label_key(&name, port)) {
                options.device_label = label.to_string();
            }
            if let Some(count) = prefs
                .get(&pixel_count_key(&name, port))
                .and_then(|v| v.parse::<u8>().ok())
            {
                options.pixel_count = count;
            }
            let Some(uid) = uids.allocate_next() else {
                warn!(device = %name, port, "no UIDs left for output, skipping");
                continue;
            };
            outputs.push(PixelOutput::new(uid, Arc::clone(&backend), options));
        }

        Self {
            name,
            device_path: device_path.to_string(),
            backend,
            outputs,
        }
    }

    /// Brings the bus up and applies the persisted per-port settings.
    pub fn start(&mut self, prefs: &Preferences) -> Result<(), DeviceError> {
        self.backend.init()?;

        for output in &mut self.outputs {
            let port = output.output_number();
            if let Some(personality) = prefs
                .get(&personality_key(&self.name, port))
                .and_then(|v| v.parse::<u16>().ok())
            {
                if !output.set_personality(personality) {
                    warn!(device = %self.name, port, personality, "ignoring saved personality");
                }
            }
            if let Some(address) = prefs
                .get(&start_address_key(&self.name, port))
                .and_then(|v| v.parse::<u16>().ok())
            {
                if !output.set_start_address(address) {
                    warn!(device = %self.name, port, address, "ignoring saved start address");
                }
            }
        }
        Ok(())
    }

    /// The device id: the file name of the bus device path.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    #[must_use]
    pub fn port_count(&self) -> usize {
        self.outputs.len()
    }

    #[must_use]
    pub fn outputs(&self) -> &[PixelOutput] {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut [PixelOutput] {
        &mut self.outputs
    }

    /// Routes a channel update to one output; false for unknown ports.
    pub fn write_slots(&mut self, port: usize, slots: &SlotBuffer) -> bool {
        match self.outputs.get_mut(port) {
            Some(output) => {
                output.write_slots(slots);
                true
            }
            None => false,
        }
    }

    /// Routes a parameter message to one output; `None` for unknown ports.
    pub fn handle_request(&mut self, port: usize, request: &ParamRequest) -> Option<ParamResponse> {
        self.outputs
            .get_mut(port)
            .map(|output| output.handle_request(request))
    }

    /// Human-readable description of one port.
    #[must_use]
    pub fn description(&self, port: usize) -> Option<String> {
        self.outputs.get(port).map(PixelOutput::description)
    }

    /// Persists the mutable per-port state and stops the writer thread.
    pub fn shutdown(&mut self, prefs: &mut Preferences) {
        for output in &self.outputs {
            let port = output.output_number();
            prefs.set(&device_label_key(&self.name, port), output.device_label());
            prefs.set(
                &personality_key(&self.name, port),
                output.personality().to_string(),
            );
            prefs.set(
                &start_address_key(&self.name, port),
                output.start_address().to_string(),
            );
            prefs.set(
                &pixel_count_key(&self.name, port),
                output.pixel_count().to_string(),
            );
        }
        self.backend.shutdown();
    }
}

fn set_defaults(prefs: &mut Preferences, name: &str) {
    prefs.set_default(
        &backend_key(name),
        &Validator::OneOf(&[HARDWARE_BACKEND, SOFTWARE_BACKEND]),
        SOFTWARE_BACKEND,
    );
    prefs.set_default(
        &speed_key(name),
        &Validator::UIntRange(0, MAX_SPEED_HZ),
        "1000000",
    );
    prefs.set_default(&ce_key(name), &Validator::Bool, "false");
    prefs.set_default(
        &port_count_key(name),
        &Validator::UIntRange(1, MAX_PORT_COUNT),
        "1",
    );
    prefs.set_default(
        &sync_port_key(name),
        &Validator::IntRange(-2, MAX_PORT_COUNT as i32),
        "0",
    );
}

fn hardware_options(prefs: &Preferences, name: &str) -> HardwareOptions {
    let mut options = HardwareOptions::default();
    for value in prefs.get_multiple(&gpio_pin_key(name)) {
        let Ok(pin) = value.parse::<u32>() else {
            warn!(device = %name, pin = %value, "invalid GPIO pin");
            continue;
        };
        if pin > MAX_GPIO_PIN {
            warn!(device = %name, pin, max = MAX_GPIO_PIN, "GPIO pin out of range");
            continue;
        }
        options.gpio_pins.push(pin as u16);
    }
    options
}

fn software_options(prefs: &Preferences, name: &str) -> SoftwareOptions {
    let mut options = SoftwareOptions::default();
    if let Some(outputs) = prefs
        .get(&port_count_key(name))
        .and_then(|v| v.parse::<u8>().ok())
    {
        options.outputs = outputs;
    }
    if let Some(sync) = prefs
        .get(&sync_port_key(name))
        .and_then(|v| v.parse::<i16>().ok())
    {
        options.sync_output = sync;
    }
    options
}

fn backend_key(name: &str) -> String {
    format!("{name}-backend")
}

fn speed_key(name: &str) -> String {
    format!("{name}-i2c-speed")
}

fn ce_key(name: &str) -> String {
    format!("{name}-ce-high")
}

fn port_count_key(name: &str) -> String {
    format!("{name}-ports")
}

fn sync_port_key(name: &str) -> String {
    format!("{name}-sync-port")
}

fn gpio_pin_key(name: &str) -> String {
    format!("{name}-gpio-pin")
}

fn device_label_key(name: &str, port: u8) -> String {
    format!("{name}-{port}-device-label")
}

fn personality_key(name: &str, port: u8) -> String {
    format!("{name}-{port}-personality")
}

fn start_address_key(name: &str, port: u8) -> String {
    format!("{name}-{port}-dmx-address")
}

fn pixel_count_key(name: &str, port: u8) -> String {
    format!("{name}-{port}-pixel-count")
}
