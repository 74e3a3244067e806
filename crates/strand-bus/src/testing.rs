//! Test doubles for writers and backends.
//!
//! [`FakeWriter`] records writes and can simulate a slow bus by blocking
//! inside `write`, which is how the overrun-drop behavior is exercised.
//! [`FakeBackend`] records committed frames per output so encoder tests
//! can assert on exact wire bytes without a writer thread.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::backend::{Backend, Checkout, CheckoutInner, OutputFrame};
use crate::error::BusError;
use crate::writer::BusWriter;

#[derive(Default)]
struct FakeWriterState {
    blocked: bool,
    write_pending: bool,
    writes: u64,
    last_write: Vec<u8>,
}

struct FakeWriterShared {
    device_path: String,
    state: Mutex<FakeWriterState>,
    cond: Condvar,
}

/// A recording bus writer.
///
/// Cloning yields another handle onto the same recorder, so a test can
/// keep one handle while moving the other into a backend.
#[derive(Clone)]
pub struct FakeWriter {
    shared: Arc<FakeWriterShared>,
}

impl FakeWriter {
    #[must_use]
    pub fn new(device_path: &str) -> Self {
        Self {
            shared: Arc::new(FakeWriterShared {
                device_path: device_path.to_string(),
                state: Mutex::new(FakeWriterState::default()),
                cond: Condvar::new(),
            }),
        }
    }

    /// Makes subsequent `write` calls block (after recording their data)
    /// until [`unblock_writer`](Self::unblock_writer).
    pub fn block_writer(&self) {
        self.shared.state.lock().blocked = true;
    }

    pub fn unblock_writer(&self) {
        self.shared.state.lock().blocked = false;
        self.shared.cond.notify_all();
    }

    /// Clears the write-seen flag so [`wait_for_write`](Self::wait_for_write)
    /// waits for the *next* write.
    pub fn reset_write(&self) {
        self.shared.state.lock().write_pending = false;
    }

    /// Blocks until a write has been recorded since the last reset.
    pub fn wait_for_write(&self) {
        let mut state = self.shared.state.lock();
        while !state.write_pending {
            self.shared.cond.wait(&mut state);
        }
    }

    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.shared.state.lock().writes
    }

    #[must_use]
    pub fn last_write(&self) -> Vec<u8> {
        self.shared.state.lock().last_write.clone()
    }

    /// Asserts the most recent write matches `expected` exactly.
    ///
    /// # Panics
    ///
    /// Panics on mismatch, like any test assertion.
    pub fn assert_data_matches(&self, expected: &[u8]) {
        let state = self.shared.state.lock();
        assert_eq!(state.last_write, expected, "unexpected bus frame");
    }
}

impl BusWriter for FakeWriter {
    fn init(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), BusError> {
        let mut state = self.shared.state.lock();
        state.writes += 1;
        state.last_write = data.to_vec();
        state.write_pending = true;
        self.shared.cond.notify_all();
        while state.blocked {
            self.shared.cond.wait(&mut state);
        }
        Ok(())
    }

    fn device_path(&self) -> &str {
        &self.shared.device_path
    }
}

#[derive(Default)]
pub(crate) struct FakeOutput {
    pub frame: OutputFrame,
    pub commits: u64,
    pub committed: Vec<u8>,
}

pub(crate) struct FakeState {
    pub outputs: Vec<FakeOutput>,
}

/// A backend that records commits instead of writing to a bus.
pub struct FakeBackend {
    device_path: String,
    output_count: usize,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    #[must_use]
    pub fn new(outputs: usize) -> Self {
        Self {
            device_path: "/dev/test".to_string(),
            output_count: outputs,
            state: Mutex::new(FakeState {
                outputs: (0..outputs).map(|_| FakeOutput::default()).collect(),
            }),
        }
    }

    /// Number of commits seen on `output`.
    #[must_use]
    pub fn commits(&self, output: usize) -> u64 {
        self.state.lock().outputs[output].commits
    }

    /// The frame bytes as of the most recent commit on `output`.
    #[must_use]
    pub fn committed(&self, output: usize) -> Vec<u8> {
        self.state.lock().outputs[output].committed.clone()
    }
}

impl Backend for FakeBackend {
    fn init(&self) -> Result<(), BusError> {
        Ok(())
    }

    fn checkout(
        &self,
        output: usize,
        payload_size: usize,
        latch_size: usize,
    ) -> Option<Checkout<'_>> {
        let mut guard = self.state.lock();
        if output >= guard.outputs.len() {
            return None;
        }
        guard.outputs[output].frame.prepare(payload_size, latch_size);
        Some(Checkout {
            inner: CheckoutInner::Fake { guard },
            output,
        })
    }

    fn device_path(&self) -> &str {
        &self.device_path
    }

    fn output_count(&self) -> usize {
        self.output_count
    }

    fn shutdown(&self) {}
}
