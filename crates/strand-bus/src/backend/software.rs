//! The software-multiplexed backend.
//!
//! All outputs share a single contiguous bus frame:
//!
//! ```text
//! output[0].payload || output[0].latch || output[1].payload || ...
//! ```
//!
//! Any commit mutates the shared frame in place; only the *sync* output's
//! commit triggers the actual bus transfer (or every commit, when no sync
//! output is configured). The latch bytes of each output double as the
//! separator between adjacent outputs on the wire.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::{Backend, Checkout, CheckoutInner};
use crate::error::BusError;
use crate::stats::BusStats;
use crate::writer::BusWriter;

/// Configuration for a [`SoftwareBackend`].
#[derive(Debug, Clone)]
pub struct SoftwareOptions {
    /// Number of logical outputs (1..32).
    pub outputs: u8,
    /// Which output's commit flushes the shared frame:
    /// `-1` flushes on every commit, `-2` aliases the last output, and a
    /// non-negative value names the output directly.
    pub sync_output: i16,
}

impl Default for SoftwareOptions {
    fn default() -> Self {
        Self {
            outputs: 1,
            sync_output: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncMode {
    EveryCommit,
    OnOutput(usize),
}

pub(crate) struct SwState {
    /// Per-output `(payload_size, latch_size)` as of the last checkout.
    pub sizes: Vec<(usize, usize)>,
    /// The concatenated bus frame.
    pub bytes: Vec<u8>,
    pub pending: bool,
    pub exit: bool,
}

struct SwShared {
    device_path: String,
    state: Mutex<SwState>,
    cond: Condvar,
    stats: Arc<BusStats>,
}

/// All outputs concatenated into one bus frame.
pub struct SoftwareBackend {
    shared: Arc<SwShared>,
    sync: SyncMode,
    output_count: usize,
    writer: Mutex<Option<Box<dyn BusWriter + Send>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SoftwareBackend {
    /// Creates the backend, taking ownership of the bus writer.
    ///
    /// The `-2` sync alias is normalized to the last output here; the
    /// output count never changes afterwards.
    #[must_use]
    pub fn new(
        options: SoftwareOptions,
        writer: Box<dyn BusWriter + Send>,
        stats: Arc<BusStats>,
    ) -> Self {
        let output_count = usize::from(options.outputs.max(1));
        let sync = match options.sync_output {
            -1 => SyncMode::EveryCommit,
            -2 => SyncMode::OnOutput(output_count - 1),
            n if n >= 0 => SyncMode::OnOutput(n as usize),
            other => {
                warn!(sync_output = other, "invalid sync output, using output 0");
                SyncMode::OnOutput(0)
            }
        };
        let device_path = writer.device_path().to_string();
        Self {
            shared: Arc::new(SwShared {
                device_path,
                state: Mutex::new(SwState {
                    sizes: vec![(0, 0); output_count],
                    bytes: Vec::new(),
                    pending: false,
                    exit: false,
                }),
                cond: Condvar::new(),
                stats,
            }),
            sync,
            output_count,
            writer: Mutex::new(Some(writer)),
            handle: Mutex::new(None),
        }
    }
}

impl Backend for SoftwareBackend {
    fn init(&self) -> Result<(), BusError> {
        let mut slot = self.writer.lock();
        let Some(mut writer) = slot.take() else {
            return Ok(());
        };

        if let Err(err) = writer.init() {
            *slot = Some(writer);
            return Err(err);
        }

        info!(
            device = %self.shared.device_path,
            outputs = self.output_count,
            "starting software backend"
        );

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("strand-writer".into())
            .spawn(move || run_writer(shared, writer))
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
        if output >= guard.sizes.len() {
            return None;
        }

        // A geometry change rebuilds the shared frame zero-filled; other
        // outputs repaint on their next update.
        if guard.sizes[output] != (payload_size, latch_size) {
            guard.sizes[output] = (payload_size, latch_size);
            let total = guard.sizes.iter().map(|&(p, l)| p + l).sum();
            guard.bytes = vec![0; total];
        }

        let offset: usize = guard.sizes[..output].iter().map(|&(p, l)| p + l).sum();
        let len = payload_size + latch_size;
        guard.bytes[offset + payload_size..offset + len].fill(0);

        let flush = match self.sync {
            SyncMode::EveryCommit => true,
            SyncMode::OnOutput(sync) => sync == output,
        };
        Some(Checkout {
            inner: CheckoutInner::Software {
                guard,
                cond: &self.shared.cond,
                stats: &self.shared.stats,
                device: &self.shared.device_path,
                offset,
                len,
                flush,
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

impl Drop for SoftwareBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_writer(shared: Arc<SwShared>, mut writer: Box<dyn BusWriter + Send>) {
    let mut frame: Vec<u8> = Vec::new();

    let mut guard = shared.state.lock();
    loop {
        while !guard.exit && !guard.pending {
            shared.cond.wait(&mut guard);
        }
        if guard.exit {
            break;
        }

        guard.pending = false;
        frame.clear();
        frame.extend_from_slice(&guard.bytes);
        MutexGuard::unlocked(&mut guard, || {
            if let Err(err) = writer.write(&frame) {
                debug!(error = %err, "frame write failed");
            }
        });
    }
}
