//! Backends: producer/consumer coordination between outputs and the bus.
//!
//! A backend owns the frame buffers for its outputs and the single writer
//! thread that drains them. Producers reserve a frame with
//! [`Backend::checkout`], fill the payload through the returned
//! [`Checkout`] guard and publish it with [`Checkout::commit`]. The
//! backend mutex is held for the whole checkout window, so producers are
//! serialized per backend.
//!
//! Committing an output whose previous frame has not been drained yet
//! replaces that frame and bumps the per-device drop counter once per
//! replaced generation. Drops are backpressure, not errors.

pub mod hardware;
pub mod software;

use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, MutexGuard};

use crate::error::BusError;
use crate::stats::BusStats;
use crate::testing::FakeState;

/// The shared contract of the hardware and software backends.
pub trait Backend: Send + Sync {
    /// Starts the writer thread; the hardware backend also acquires its
    /// GPIO select lines here. Fatal on failure: the bus stays
    /// unregistered.
    fn init(&self) -> Result<(), BusError>;

    /// Reserves a writable frame of exactly `payload_size + latch_size`
    /// bytes for `output`.
    ///
    /// The trailing `latch_size` bytes are zero when this returns; the
    /// caller fills the payload head and calls [`Checkout::commit`].
    /// Returns `None` when `output` is out of range, without touching any
    /// counter. Dropping the guard without committing publishes nothing.
    fn checkout(&self, output: usize, payload_size: usize, latch_size: usize)
        -> Option<Checkout<'_>>;

    /// The device path of the underlying writer.
    fn device_path(&self) -> &str;

    /// Number of logical outputs on this backend.
    fn output_count(&self) -> usize;

    /// Stops the writer thread and joins it. Undrained frames are
    /// discarded; a write already in progress completes. Idempotent.
    fn shutdown(&self);
}

/// One output's frame storage.
///
/// The buffer persists across checkouts: bytes the producer does not
/// overwrite keep their previous contents. Growing reuses capacity where
/// possible and zero-fills the newly exposed tail; the latch region is
/// re-zeroed on every checkout.
#[derive(Debug, Default)]
pub(crate) struct OutputFrame {
    pub bytes: Vec<u8>,
    pub pending: bool,
}

impl OutputFrame {
    pub(crate) fn prepare(&mut self, payload_size: usize, latch_size: usize) {
        let total = payload_size + latch_size;
        if self.bytes.len() < total {
            self.bytes.resize(total, 0);
        } else {
            self.bytes.truncate(total);
        }
        self.bytes[payload_size..].fill(0);
    }
}

pub(crate) enum CheckoutInner<'a> {
    Hardware {
        guard: MutexGuard<'a, hardware::HwState>,
        cond: &'a Condvar,
        stats: &'a BusStats,
        device: &'a str,
    },
    Software {
        guard: MutexGuard<'a, software::SwState>,
        cond: &'a Condvar,
        stats: &'a BusStats,
        device: &'a str,
        offset: usize,
        len: usize,
        flush: bool,
    },
    Fake {
        guard: MutexGuard<'a, FakeState>,
    },
}

/// A reserved frame, writable until committed.
///
/// Dereferences to the full `payload_size + latch_size` byte region. The
/// backend mutex is held for the lifetime of the guard, which bounds the
/// region's lifetime; `commit` consumes the guard so the region cannot be
/// retained afterwards.
pub struct Checkout<'a> {
    pub(crate) inner: CheckoutInner<'a>,
    pub(crate) output: usize,
}

impl Checkout<'_> {
    /// Publishes the frame to the writer thread.
    ///
    /// If the output still has an undrained frame, that frame is replaced
    /// and the device's drop counter is incremented once.
    pub fn commit(self) {
        let Checkout { inner, output } = self;
        match inner {
            CheckoutInner::Hardware {
                mut guard,
                cond,
                stats,
                device,
            } => {
                let frame = &mut guard.outputs[output];
                if frame.pending {
                    stats.add_drop(device);
                }
                frame.pending = true;
                drop(guard);
                cond.notify_one();
            }
            CheckoutInner::Software {
                mut guard,
                cond,
                stats,
                device,
                flush,
                ..
            } => {
                // Non-sync commits have already mutated the shared frame;
                // only the sync output wakes the writer.
                if flush {
                    if guard.pending {
                        stats.add_drop(device);
                    }
                    guard.pending = true;
                    drop(guard);
                    cond.notify_one();
                }
            }
            CheckoutInner::Fake { mut guard } => {
                let out = &mut guard.outputs[output];
                out.commits += 1;
                out.committed = out.frame.bytes.clone();
            }
        }
    }
}

impl Deref for Checkout<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.inner {
            CheckoutInner::Hardware { guard, .. } => &guard.outputs[self.output].bytes,
            CheckoutInner::Software {
                guard, offset, len, ..
            } => &guard.bytes[*offset..offset + len],
            CheckoutInner::Fake { guard } => &guard.outputs[self.output].frame.bytes,
        }
    }
}

impl DerefMut for Checkout<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.inner {
            CheckoutInner::Hardware { guard, .. } => &mut guard.outputs[self.output].bytes,
            CheckoutInner::Software {
                guard, offset, len, ..
            } => {
                let start = *offset;
                &mut guard.bytes[start..start + *len]
            }
            CheckoutInner::Fake { guard } => &mut guard.outputs[self.output].frame.bytes,
        }
    }
}
