//! Queue and drain statistics.

/// Snapshot of queue occupancy, taken under the lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Ring capacity `N`.
    pub capacity: usize,
    /// Current `empty_count`, always within `[0, capacity]`.
    pub empty_slots: usize,
    /// Slots waiting to be blitted.
    pub pending_blit: usize,
    /// Slots whose content was abandoned but not yet resolved.
    pub pending_discard: usize,
    /// Items parked in the pure-color side queue.
    pub pure_color: usize,
}

/// Outcome of one drain pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Items copied into their destination texture.
    pub completed: u32,
    /// Items dropped because their tile/texture pair went stale.
    pub dropped_obsolete: u32,
    /// Previously discarded items resolved this pass.
    pub discarded: u32,
    /// Pure-color items applied.
    pub pure_color: u32,
}

impl DrainStats {
    /// True when the pass had no effect on any destination texture.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.completed == 0
            && self.dropped_obsolete == 0
            && self.discarded == 0
            && self.pure_color == 0
    }
}
