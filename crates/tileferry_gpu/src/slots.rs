//! Device-free bookkeeping for the shared surface slots.
//!
//! The wgpu backend rotates frames through a small fixed pool of staging
//! textures. This module tracks which pool slot the next produce writes and
//! the next consume reads, without touching any GPU object, so the rotation
//! logic stays unit-testable.

/// Monotonic produce/consume counters over a fixed slot pool.
#[derive(Debug)]
pub(crate) struct SlotCounters {
    len: usize,
    produced: u64,
    consumed: u64,
}

impl SlotCounters {
    /// Creates counters for a pool of `len` slots.
    ///
    /// # Panics
    /// Panics when `len` is zero.
    pub(crate) fn new(len: usize) -> Self {
        assert!(len > 0, "shared surface needs at least one slot");
        Self {
            len,
            produced: 0,
            consumed: 0,
        }
    }

    pub(crate) const fn produced(&self) -> u64 {
        self.produced
    }

    pub(crate) const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Slot index the next produce writes, or `None` when every slot still
    /// holds an unconsumed frame.
    pub(crate) fn produce_slot(&mut self) -> Option<usize> {
        if self.produced - self.consumed >= self.len as u64 {
            return None;
        }
        let index = (self.produced % self.len as u64) as usize;
        self.produced += 1;
        Some(index)
    }

    /// Advances the read side, returning the slot index that became current.
    pub(crate) fn consume_slot(&mut self) -> Option<usize> {
        if self.consumed >= self.produced {
            return None;
        }
        let index = (self.consumed % self.len as u64) as usize;
        self.consumed += 1;
        Some(index)
    }

    /// Slot of the most recently consumed frame, the source for blits.
    pub(crate) fn current_slot(&self) -> Option<usize> {
        if self.consumed == 0 {
            return None;
        }
        Some(((self.consumed - 1) % self.len as u64) as usize)
    }
}
