//! Producer-side enqueue protocol.

use parking_lot::MutexGuard;
use tracing::{trace, warn};

use crate::bitmap::Bitmap;
use crate::error::EnqueueError;
use crate::geom::Rgba8;
use crate::item::{ItemStatus, PureColorItem, TransferRequest, UploadMode};

use super::{QueueState, TransferQueue};

impl TransferQueue {
    /// Publishes freshly rendered tile content, blocking until a slot is
    /// free.
    ///
    /// In GPU mode `frame` is written into the shared buffer; in CPU mode
    /// it is copied into the slot's owned payload. On failure nothing was
    /// enqueued and no slot was consumed; the caller must mark the tile's
    /// texture transfer-failed so the tile is repainted and rescheduled.
    pub fn try_enqueue(
        &self,
        request: &TransferRequest,
        frame: &Bitmap,
    ) -> Result<(), EnqueueError> {
        // One lock covers the whole update; without it a concurrent discard
        // could clear the queue between the wait and the publish.
        let mut state = self.state.lock();
        self.wait_for_free_slot(&mut state)?;

        let mode = state.upload_mode;
        if mode == UploadMode::Gpu {
            state
                .backend
                .produce(frame)
                .map_err(EnqueueError::ProduceFailed)?;
        }

        let index = state.ring.advance_write();
        let slot = state.ring.slot_mut(index);
        if slot.status() != ItemStatus::Empty {
            warn!(index, status = ?slot.status(), "publishing into an occupied slot");
        }
        slot.publish(request, mode);
        if mode == UploadMode::Cpu {
            slot.attach_payload(frame);
        }
        state.ring.note_filled();

        trace!(tile = ?request.tile, ?mode, "transfer enqueued");
        Ok(())
    }

    /// Publishes a solid-color tile to the unbounded side queue.
    ///
    /// Color-only content carries no payload and never touches the shared
    /// buffer, so it needs none of the bounded-slot bookkeeping.
    pub fn enqueue_pure_color(&self, request: &TransferRequest, color: Rgba8) {
        let mut state = self.state.lock();
        state.pure_color.push(PureColorItem {
            tile: request.tile,
            texture: request.texture,
            color,
        });
    }

    /// Waits for an empty slot. Must be called with the lock held.
    ///
    /// Deliberately waits at most once rather than in a loop: during
    /// teardown the empty count stays at zero forever, and a re-wait would
    /// turn the woken producer right back into a deadlocked one.
    fn wait_for_free_slot(
        &self,
        state: &mut MutexGuard<'_, QueueState>,
    ) -> Result<(), EnqueueError> {
        if !state.has_gpu_context {
            return Err(EnqueueError::ContextLost);
        }
        if state.ring.empty_count() == 0 {
            if state.interrupted {
                return Err(EnqueueError::Interrupted);
            }
            self.slot_freed.wait(state);
            if state.interrupted {
                return Err(EnqueueError::Interrupted);
            }
        }
        if !state.has_gpu_context {
            return Err(EnqueueError::ContextLost);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{CapacityPreset, TransferConfig};
    use crate::error::{BackendError, EnqueueError};
    use crate::geom::SizePx;
    use crate::interop::{TextureId, TileDirectory, TileHandle};
    use crate::item::{TransferRequest, UploadMode};
    use crate::queue::TransferQueue;
    use crate::testing::{MapTiles, RecordingBackend};
    use crate::Bitmap;

    fn gpu_queue(preset: CapacityPreset) -> (TransferQueue, RecordingBackend) {
        let backend = RecordingBackend::new();
        let probe = backend.probe();
        let config = TransferConfig {
            capacity: preset,
            upload_mode: UploadMode::Gpu,
        };
        (TransferQueue::new(config, Box::new(backend)), probe)
    }

    fn request(texture: u64) -> TransferRequest {
        TransferRequest {
            tile: TileHandle::new(0, 0),
            texture: TextureId(texture),
            content_size: SizePx::new(16, 16),
            inval: None,
        }
    }

    #[test]
    fn enqueue_fails_without_gpu_context() {
        let (queue, probe) = gpu_queue(CapacityPreset::Minimal);
        queue.set_gpu_context(false);

        let result = queue.try_enqueue(&request(1), &Bitmap::new(SizePx::new(16, 16)));

        assert_eq!(result, Err(EnqueueError::ContextLost));
        assert_eq!(probe.produced(), 0);
        assert_eq!(queue.stats().empty_slots, 1);
    }

    #[test]
    fn enqueue_fails_when_full_and_interrupted() {
        let (queue, _probe) = gpu_queue(CapacityPreset::Minimal);
        let frame = Bitmap::new(SizePx::new(16, 16));
        queue.try_enqueue(&request(1), &frame).unwrap();
        queue.interrupt(true);

        let result = queue.try_enqueue(&request(2), &frame);

        assert_eq!(result, Err(EnqueueError::Interrupted));
        assert_eq!(queue.stats().empty_slots, 0);
        assert_eq!(queue.stats().pending_blit, 1);
    }

    #[test]
    fn produce_failure_aborts_without_consuming_a_slot() {
        let (queue, probe) = gpu_queue(CapacityPreset::Minimal);
        probe.set_fail_produce(true);

        let result = queue.try_enqueue(&request(1), &Bitmap::new(SizePx::new(16, 16)));

        assert_eq!(
            result,
            Err(EnqueueError::ProduceFailed(BackendError::NoBufferAvailable))
        );
        assert_eq!(queue.stats().empty_slots, 1);
        assert_eq!(queue.stats().pending_blit, 0);
    }

    #[test]
    fn cpu_mode_never_touches_the_shared_buffer() {
        let backend = RecordingBackend::new();
        let probe = backend.probe();
        let config = TransferConfig {
            capacity: CapacityPreset::Efficient,
            upload_mode: UploadMode::Cpu,
        };
        let queue = TransferQueue::new(config, Box::new(backend));

        queue
            .try_enqueue(&request(1), &Bitmap::new(SizePx::new(16, 16)))
            .unwrap();

        assert_eq!(probe.produced(), 0);
        assert_eq!(queue.stats().pending_blit, 1);
    }

    #[test]
    fn caller_marks_the_texture_failed_after_a_rejected_enqueue() {
        let (queue, probe) = gpu_queue(CapacityPreset::Minimal);
        probe.set_fail_produce(true);
        let tile = TileHandle::new(0, 0);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(TextureId(1)), None);

        let result = queue.try_enqueue(&request(1), &Bitmap::new(SizePx::new(16, 16)));
        assert!(result.is_err());

        // Failure marking is the producer's job, not the queue's: the
        // scheduler needs the mark to repaint and resubmit the tile.
        tiles.mark_transfer_failed(tile);

        assert_eq!(tiles.failed(tile), 1);
        assert_eq!(queue.stats().pending_blit, 0);
    }

    #[test]
    fn pure_color_bypasses_slot_bookkeeping() {
        let (queue, probe) = gpu_queue(CapacityPreset::Minimal);

        queue.enqueue_pure_color(&request(1), crate::Rgba8::WHITE);
        queue.enqueue_pure_color(&request(2), crate::Rgba8::TRANSPARENT);

        let stats = queue.stats();
        assert_eq!(stats.pure_color, 2);
        assert_eq!(stats.empty_slots, 1);
        assert_eq!(probe.produced(), 0);
    }
}
