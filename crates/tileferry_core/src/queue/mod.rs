//! The transfer queue: producer/consumer hand-off of rendered tile content.
//!
//! One `parking_lot` mutex guards every piece of mutable state: ring
//! slots, counters, flags, the side queue and the GPU backend. The ring is
//! small and drain runs once per frame, so contention does not justify
//! anything finer-grained. A single condition variable wakes producers
//! whenever capacity returns, the queue is interrupted, or the GPU context
//! is restored.

mod discard;
mod drain;
mod enqueue;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::config::TransferConfig;
use crate::interop::{GpuBackend, TileDirectory};
use crate::item::{ItemStatus, PureColorItem, UploadMode};
use crate::ring::TransferRing;
use crate::stats::{DrainStats, QueueStats};

/// Bounded transfer pipeline between one producer and one consumer thread.
///
/// A third thread may call [`TransferQueue::interrupt`] or
/// [`TransferQueue::set_pending_discard`] at any time to cancel in-flight
/// work cooperatively.
pub struct TransferQueue {
    state: Mutex<QueueState>,
    slot_freed: Condvar,
}

/// All mutable queue state, guarded by the one lock.
///
/// Kept as a single struct rather than free-standing shared variables so
/// the invariant set stays auditable.
struct QueueState {
    ring: TransferRing,
    pure_color: Vec<PureColorItem>,
    backend: Box<dyn GpuBackend>,
    has_gpu_context: bool,
    interrupted: bool,
    upload_mode: UploadMode,
}

impl TransferQueue {
    /// Creates a queue with the configured capacity and upload mode,
    /// taking ownership of the GPU backend.
    #[must_use]
    pub fn new(config: TransferConfig, backend: Box<dyn GpuBackend>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ring: TransferRing::new(config.capacity.slots()),
                pure_color: Vec::new(),
                backend,
                has_gpu_context: true,
                interrupted: false,
                upload_mode: config.upload_mode,
            }),
            slot_freed: Condvar::new(),
        }
    }

    /// Ring capacity `N`.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.lock().ring.capacity()
    }

    /// Current queue-wide upload mode.
    #[must_use]
    pub fn upload_mode(&self) -> UploadMode {
        self.state.lock().upload_mode
    }

    /// Switches the queue-wide upload mode.
    ///
    /// In-flight items captured the previous mode, and mixing modes would
    /// break the shared-buffer correspondence, so everything pending is
    /// force-discarded before the switch takes effect.
    pub fn set_upload_mode(&self, mode: UploadMode) {
        let mut state = self.state.lock();
        if state.upload_mode == mode {
            return;
        }
        state.set_pending_discard(&self.slot_freed);
        state.upload_mode = mode;
        debug!(?mode, "upload mode switched");
    }

    /// Whether the queue currently believes a GPU context is usable.
    #[must_use]
    pub fn has_gpu_context(&self) -> bool {
        self.state.lock().has_gpu_context
    }

    /// Marks the GPU context usable or lost.
    ///
    /// Restoring the context wakes blocked producers; drain restores it
    /// implicitly as well.
    pub fn set_gpu_context(&self, has_context: bool) {
        let mut state = self.state.lock();
        if state.has_gpu_context == has_context {
            return;
        }
        state.has_gpu_context = has_context;
        if has_context {
            self.slot_freed.notify_all();
        }
    }

    /// Sets or clears the interrupt flag.
    ///
    /// Turning it on wakes every waiter immediately so a blocked producer
    /// aborts instead of deadlocking against a removal operation running
    /// on another thread. Idempotent.
    pub fn interrupt(&self, on: bool) {
        let mut state = self.state.lock();
        state.interrupted = on;
        if on {
            self.slot_freed.notify_all();
        }
    }

    /// Snapshot of queue occupancy.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            capacity: state.ring.capacity(),
            empty_slots: state.ring.empty_count(),
            pending_blit: state.ring.count_status(ItemStatus::PendingBlit),
            pending_discard: state.ring.count_status(ItemStatus::PendingDiscard),
            pure_color: state.pure_color.len(),
        }
    }

    /// Discards all in-flight work, resolves it, and releases the GPU
    /// resources.
    ///
    /// The queue stays usable afterwards only once a context is restored;
    /// normally this precedes destruction.
    pub fn teardown(&self, tiles: &mut dyn TileDirectory) {
        let mut state = self.state.lock();
        state.set_pending_discard(&self.slot_freed);
        let mut stats = DrainStats::default();
        state.resolve_pending_discards(tiles, &mut stats);
        state.backend.release();
    }
}

impl Drop for TransferQueue {
    fn drop(&mut self) {
        self.state.get_mut().backend.release();
    }
}
