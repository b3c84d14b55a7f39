//! Cancellation of in-flight work: removal operations and context loss.

use parking_lot::Condvar;
use tracing::error;

use crate::interop::TileDirectory;
use crate::item::{ItemStatus, UploadMode};
use crate::stats::DrainStats;

use super::{QueueState, TransferQueue};

impl TransferQueue {
    /// Abandons every pending transfer. Callable from any thread.
    ///
    /// After this returns nothing new is accepted until a drain (or
    /// [`TransferQueue::set_gpu_context`]) restores the context. The
    /// abandoned items stay parked as pending-discard until the consumer
    /// thread resolves them, because their shared-buffer correspondence
    /// can only be settled there.
    pub fn set_pending_discard(&self) {
        let mut state = self.state.lock();
        state.set_pending_discard(&self.slot_freed);
    }
}

impl QueueState {
    /// Marks all pending work discarded and drops the GPU context.
    ///
    /// Must be called with the lock held.
    pub(super) fn set_pending_discard(&mut self, slot_freed: &Condvar) {
        for index in 0..self.ring.capacity() {
            let item = self.ring.slot_mut(index);
            if item.status() == ItemStatus::PendingBlit {
                item.mark_discard();
            }
        }

        // Color-only items have no shared-buffer correspondence to salvage.
        self.pure_color.clear();

        let had_context = self.has_gpu_context;
        // Unblock the producer before any tile teardown walks tile state on
        // the other thread; waking it afterwards is a deadlock.
        self.has_gpu_context = false;

        // Only signal on the transition, not on repeated discards.
        if had_context {
            slot_freed.notify_one();
        }
    }

    /// Resolves parked discards on the consumer thread.
    ///
    /// Each GPU-mode item still advances the shared buffer exactly once.
    /// If the tile/texture pair is still mutually valid the texture is
    /// dropped so the tile gets repainted and retransferred. Idempotent:
    /// a second call with no intervening enqueue finds nothing to do.
    pub(super) fn resolve_pending_discards(
        &mut self,
        tiles: &mut dyn TileDirectory,
        stats: &mut DrainStats,
    ) {
        let QueueState { ring, backend, .. } = self;
        let capacity = ring.capacity();
        let oldest = ring.oldest_index();

        for offset in 0..capacity {
            let index = (oldest + offset) % capacity;
            let item = ring.slot_mut(index);
            if item.status() != ItemStatus::PendingDiscard {
                continue;
            }

            if item.mode() == UploadMode::Gpu {
                if let Err(err) = backend.consume() {
                    error!(error = %err, "unexpected consume status while discarding");
                }
            }

            if let (Some(tile), Some(texture)) = (item.tile(), item.texture()) {
                if tiles.back_texture(tile) == Some(texture) {
                    tiles.drop_back_texture(tile);
                }
            }

            item.reset();
            stats.discarded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{CapacityPreset, TransferConfig};
    use crate::geom::SizePx;
    use crate::interop::{TextureId, TileHandle};
    use crate::item::{TransferRequest, UploadMode};
    use crate::queue::TransferQueue;
    use crate::testing::{MapTiles, RecordingBackend};
    use crate::Bitmap;

    const SIZE: SizePx = SizePx::new(16, 16);

    fn gpu_queue(preset: CapacityPreset) -> (TransferQueue, RecordingBackend) {
        let backend = RecordingBackend::new();
        let probe = backend.probe();
        let config = TransferConfig {
            capacity: preset,
            upload_mode: UploadMode::Gpu,
        };
        (TransferQueue::new(config, Box::new(backend)), probe)
    }

    fn request(tile: TileHandle, texture: TextureId) -> TransferRequest {
        TransferRequest {
            tile,
            texture,
            content_size: SIZE,
            inval: None,
        }
    }

    #[test]
    fn discard_parks_items_and_drops_context() {
        let (queue, _probe) = gpu_queue(CapacityPreset::Efficient);
        let frame = Bitmap::new(SIZE);
        queue
            .try_enqueue(&request(TileHandle::new(0, 0), TextureId(1)), &frame)
            .unwrap();

        queue.set_pending_discard();

        let stats = queue.stats();
        assert_eq!(stats.pending_blit, 0);
        assert_eq!(stats.pending_discard, 1);
        assert!(!queue.has_gpu_context());
    }

    #[test]
    fn discarded_gpu_items_keep_the_buffer_correspondence() {
        let (queue, probe) = gpu_queue(CapacityPreset::Efficient);
        let tile = TileHandle::new(0, 0);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(TextureId(1)), None);

        let frame = Bitmap::new(SIZE);
        queue.try_enqueue(&request(tile, TextureId(1)), &frame).unwrap();
        queue.try_enqueue(&request(tile, TextureId(1)), &frame).unwrap();
        queue.set_pending_discard();

        let stats = queue.drain(&mut tiles);

        assert_eq!(stats.discarded, 2);
        assert_eq!(probe.produced(), 2);
        assert_eq!(probe.consumed(), 2);
        assert!(probe.is_balanced());
    }

    #[test]
    fn valid_tile_texture_pair_is_dropped_for_repaint() {
        let (queue, _probe) = gpu_queue(CapacityPreset::Minimal);
        let tile = TileHandle::new(0, 0);
        let texture = TextureId(1);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(texture), None);

        queue
            .try_enqueue(&request(tile, texture), &Bitmap::new(SIZE))
            .unwrap();
        queue.set_pending_discard();
        queue.drain(&mut tiles);

        assert_eq!(tiles.dropped_back(tile), 1);
    }

    #[test]
    fn stale_pair_is_not_dropped() {
        let (queue, _probe) = gpu_queue(CapacityPreset::Minimal);
        let tile = TileHandle::new(0, 0);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(TextureId(1)), None);

        queue
            .try_enqueue(&request(tile, TextureId(1)), &Bitmap::new(SIZE))
            .unwrap();
        // The tile was recycled onto a different texture in the meantime.
        tiles.set_back_texture(tile, Some(TextureId(2)));
        queue.set_pending_discard();
        queue.drain(&mut tiles);

        assert_eq!(tiles.dropped_back(tile), 0);
    }

    #[test]
    fn resolve_is_idempotent() {
        let (queue, probe) = gpu_queue(CapacityPreset::Efficient);
        let tile = TileHandle::new(0, 0);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(TextureId(1)), None);

        queue
            .try_enqueue(&request(tile, TextureId(1)), &Bitmap::new(SIZE))
            .unwrap();
        queue.set_pending_discard();

        let first = queue.drain(&mut tiles);
        let second = queue.drain(&mut tiles);

        assert_eq!(first.discarded, 1);
        assert!(second.is_noop());
        assert_eq!(probe.consumed(), 1);
        assert_eq!(tiles.dropped_back(tile), 1);
    }

    #[test]
    fn mode_switch_discards_before_accepting_new_mode() {
        let (queue, probe) = gpu_queue(CapacityPreset::Efficient);
        let tile = TileHandle::new(0, 0);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(TextureId(1)), None);

        queue
            .try_enqueue(&request(tile, TextureId(1)), &Bitmap::new(SIZE))
            .unwrap();

        queue.set_upload_mode(UploadMode::Cpu);
        assert_eq!(queue.stats().pending_discard, 1);
        assert!(!queue.has_gpu_context());

        // Drain resolves the old-mode leftovers and restores the context.
        queue.drain(&mut tiles);
        assert!(probe.is_balanced());
        assert!(queue.has_gpu_context());

        queue
            .try_enqueue(&request(tile, TextureId(1)), &Bitmap::new(SIZE))
            .unwrap();
        // The new item is CPU mode: the shared buffer was not produced into.
        assert_eq!(probe.produced(), 1);
    }

    #[test]
    fn switching_to_the_same_mode_discards_nothing() {
        let (queue, _probe) = gpu_queue(CapacityPreset::Efficient);
        queue
            .try_enqueue(&request(TileHandle::new(0, 0), TextureId(1)), &Bitmap::new(SIZE))
            .unwrap();

        queue.set_upload_mode(UploadMode::Gpu);

        assert_eq!(queue.stats().pending_blit, 1);
        assert!(queue.has_gpu_context());
    }
}
