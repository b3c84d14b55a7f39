//! Fixed-capacity circular array of transfer items.
//!
//! Pure data structure: all synchronization lives in the queue that owns it.

use crate::item::{ItemStatus, TransferItem};

/// The transfer ring buffer.
///
/// `empty_count` is maintained by the owner and must always equal the
/// number of `Empty` slots at quiescent points; the consumer resets it to
/// the full capacity at the end of every drain.
#[derive(Debug)]
pub(crate) struct TransferRing {
    slots: Box<[TransferItem]>,
    write_index: usize,
    empty_count: usize,
}

impl TransferRing {
    /// Creates a ring with `capacity` empty slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "transfer ring needs at least one slot");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, TransferItem::default);
        Self {
            slots: slots.into_boxed_slice(),
            write_index: 0,
            empty_count: capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn empty_count(&self) -> usize {
        self.empty_count
    }

    /// Index of the oldest slot, where the next drain pass starts.
    pub(crate) fn oldest_index(&self) -> usize {
        (self.write_index + 1) % self.capacity()
    }

    /// Advances the write cursor and returns the slot index to fill.
    pub(crate) fn advance_write(&mut self) -> usize {
        self.write_index = (self.write_index + 1) % self.capacity();
        self.write_index
    }

    pub(crate) fn slot(&self, index: usize) -> &TransferItem {
        &self.slots[index]
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut TransferItem {
        &mut self.slots[index]
    }

    /// Records that one slot left the `Empty` state.
    ///
    /// Saturates at zero: a producer woken into a still-full ring (context
    /// restored while no drain ran) overwrites a slot, and the count must
    /// stay in range rather than underflow.
    pub(crate) fn note_filled(&mut self) {
        self.empty_count = self.empty_count.saturating_sub(1);
    }

    /// Restores full capacity after a complete drain pass.
    pub(crate) fn reset_capacity(&mut self) {
        self.empty_count = self.capacity();
    }

    /// Number of slots currently in `status`.
    pub(crate) fn count_status(&self, status: ItemStatus) -> usize {
        self.slots.iter().filter(|s| s.status() == status).count()
    }
}
