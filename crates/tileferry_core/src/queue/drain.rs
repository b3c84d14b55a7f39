//! Consumer-side drain protocol.
//!
//! Runs once per compositing cycle, wholly under the queue lock: releasing
//! the lock mid-drain would let a concurrently enqueuing producer observe
//! half-reset item state.

use tracing::{debug, error, warn};

use crate::interop::{TextureId, TileDirectory, TileHandle};
use crate::item::{ItemStatus, UploadMode};
use crate::stats::DrainStats;

use super::{QueueState, TransferQueue};

/// Content is obsolete when the tile is gone or its current back texture is
/// no longer the instance the content was generated for.
pub(super) fn is_obsolete(
    tiles: &dyn TileDirectory,
    tile: TileHandle,
    texture: TextureId,
) -> bool {
    tiles.back_texture(tile) != Some(texture)
}

impl TransferQueue {
    /// Resolves every pending and discarded item, copying live content into
    /// its destination texture, then restores full capacity and wakes the
    /// producer.
    ///
    /// Draining implies the GPU context is usable again.
    pub fn drain(&self, tiles: &mut dyn TileDirectory) -> DrainStats {
        let mut state = self.state.lock();
        let mut stats = DrainStats::default();

        // Discards first: their shared-buffer correspondence must be
        // settled before any new consume below.
        state.resolve_pending_discards(tiles, &mut stats);
        state.has_gpu_context = true;

        state.drain_pure_color(tiles, &mut stats);
        state.drain_ring(tiles, &mut stats);

        state.ring.reset_capacity();
        self.slot_freed.notify_all();
        stats
    }
}

impl QueueState {
    /// Applies the pure-color side queue and clears it unconditionally.
    pub(super) fn drain_pure_color(
        &mut self,
        tiles: &mut dyn TileDirectory,
        stats: &mut DrainStats,
    ) {
        for item in self.pure_color.drain(..) {
            if is_obsolete(&*tiles, item.tile, item.texture) {
                debug!(tile = ?item.tile, "dropping obsolete pure-color tile");
                stats.dropped_obsolete += 1;
                continue;
            }
            tiles.set_pure_color(item.texture, item.color);
            tiles.mark_transfer_complete(item.texture);
            stats.pure_color += 1;
        }
    }

    /// Walks the ring exactly once, oldest slot first.
    fn drain_ring(&mut self, tiles: &mut dyn TileDirectory, stats: &mut DrainStats) {
        let QueueState { ring, backend, .. } = self;
        let capacity = ring.capacity();
        let oldest = ring.oldest_index();
        let mut in_blit_pass = false;

        for offset in 0..capacity {
            let index = (oldest + offset) % capacity;
            let item = ring.slot_mut(index);
            if item.status() != ItemStatus::PendingBlit {
                continue;
            }

            let mode = item.mode();
            let size = item.content_size();
            let inval = item.inval();
            let target = match (item.tile(), item.texture()) {
                (Some(tile), Some(texture)) if !is_obsolete(&*tiles, tile, texture) => {
                    Some((tile, texture))
                }
                _ => None,
            };

            // The shared buffer advances once per GPU item regardless of
            // what happens to the content.
            if mode == UploadMode::Gpu {
                if let Err(err) = backend.consume() {
                    error!(error = %err, "unexpected shared buffer consume status");
                }
            }

            let Some((tile, texture)) = target else {
                debug!(tile = ?item.tile(), "dropping obsolete transfer");
                item.reset();
                stats.dropped_obsolete += 1;
                continue;
            };
            item.reset();

            // Guarantee there is storage to copy into.
            if let Err(err) = backend.ensure_backing(texture, size) {
                error!(error = %err, ?texture, "no backing storage; dropping transfer");
                stats.dropped_obsolete += 1;
                continue;
            }

            match mode {
                UploadMode::Cpu => {
                    // Reborrow the slot: the payload outlives the reset.
                    if let Some(payload) = ring.slot(index).payload() {
                        if let Err(err) = backend.upload(texture, payload, inval) {
                            error!(error = %err, "bitmap upload failed");
                        }
                    } else {
                        warn!(index, "cpu transfer without payload");
                    }
                }
                UploadMode::Gpu => {
                    if !in_blit_pass {
                        backend.begin_blits();
                        in_blit_pass = true;
                    }
                    // A partial update leaves the rest of the texture
                    // undefined unless the previous content is recopied
                    // first. The front texture may be absent on the very
                    // first transfer.
                    let front = tiles.front_texture(tile);
                    if let (Some(rect), Some(front)) = (inval, front) {
                        if rect.is_strict_subregion_of(size) {
                            if let Err(err) = backend.copy_texture(front, texture, size) {
                                error!(error = %err, "front texture recopy failed");
                            }
                        }
                    }
                    if let Err(err) = backend.blit_from_shared(texture, size, inval) {
                        error!(error = %err, "shared buffer blit failed");
                    }
                }
            }

            tiles.set_not_pure(texture);
            tiles.mark_transfer_complete(texture);
            stats.completed += 1;
        }

        // Leave no observable side effects on unrelated rendering state.
        if in_blit_pass {
            backend.end_blits();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{CapacityPreset, TransferConfig};
    use crate::geom::{RectPx, Rgba8, SizePx};
    use crate::interop::{TextureId, TileHandle};
    use crate::item::{TransferRequest, UploadMode};
    use crate::queue::TransferQueue;
    use crate::testing::{BackendEvent, MapTiles, RecordingBackend};
    use crate::Bitmap;

    const SIZE: SizePx = SizePx::new(16, 16);

    fn queue_with(preset: CapacityPreset, mode: UploadMode) -> (TransferQueue, RecordingBackend) {
        let backend = RecordingBackend::new();
        let probe = backend.probe();
        let config = TransferConfig {
            capacity: preset,
            upload_mode: mode,
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
    fn cpu_full_update_lands_in_destination_texture() {
        let (queue, probe) = queue_with(CapacityPreset::Minimal, UploadMode::Cpu);
        let tile = TileHandle::new(0, 0);
        let texture = TextureId(1);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(texture), None);

        let frame = Bitmap::solid(SIZE, Rgba8::new(9, 8, 7, 255));
        // A rect spanning the whole tile behaves like a full update.
        let mut req = request(tile, texture);
        req.inval = Some(RectPx::new(0, 0, 16, 16));
        queue.try_enqueue(&req, &frame).unwrap();

        let stats = queue.drain(&mut tiles);

        assert_eq!(stats.completed, 1);
        assert_eq!(probe.texture(texture).unwrap(), frame);
        assert_eq!(tiles.flags(texture).completed, 1);
        assert!(tiles.flags(texture).not_pure);
        assert_eq!(queue.stats().empty_slots, 1);
        assert_eq!(queue.stats().pending_blit, 0);
    }

    #[test]
    fn obsolete_gpu_item_still_advances_the_shared_buffer() {
        let (queue, probe) = queue_with(CapacityPreset::Minimal, UploadMode::Gpu);
        let tile = TileHandle::new(0, 0);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(TextureId(1)), None);

        queue
            .try_enqueue(&request(tile, TextureId(1)), &Bitmap::new(SIZE))
            .unwrap();
        // Tile got a new texture instance before the drain.
        tiles.set_back_texture(tile, Some(TextureId(2)));

        let stats = queue.drain(&mut tiles);

        assert_eq!(stats.dropped_obsolete, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(probe.consumed(), 1);
        assert!(probe.is_balanced());
        // Destination textures were never touched.
        assert!(probe.texture(TextureId(1)).is_none());
        assert!(probe.texture(TextureId(2)).is_none());
        assert_eq!(queue.stats().empty_slots, 1);
    }

    #[test]
    fn partial_gpu_update_recopies_front_texture_first() {
        let (queue, probe) = queue_with(CapacityPreset::Efficient, UploadMode::Gpu);
        let tile = TileHandle::new(0, 0);
        let back = TextureId(1);
        let front = TextureId(2);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(back), Some(front));

        // The front texture already has content to preserve.
        let base = Bitmap::solid(SIZE, Rgba8::new(1, 1, 1, 255));
        probe.install_texture(front, base);

        let rect = RectPx::new(4, 4, 8, 8);
        let mut req = request(tile, back);
        req.inval = Some(rect);
        queue
            .try_enqueue(&req, &Bitmap::solid(SIZE, Rgba8::new(5, 5, 5, 255)))
            .unwrap();

        queue.drain(&mut tiles);

        let events = probe.events();
        let copy_at = events
            .iter()
            .position(|e| matches!(e, BackendEvent::CopyTexture { src, dst } if *src == front && *dst == back))
            .expect("front recopy happened");
        let blit_at = events
            .iter()
            .position(
                |e| matches!(e, BackendEvent::BlitFromShared { dst, inval } if *dst == back && *inval == Some(rect)),
            )
            .expect("rect blit happened");
        assert!(copy_at < blit_at, "recopy must precede the rect blit");

        // Outside the rect the preserved front content survived.
        let result = probe.texture(back).unwrap();
        assert_eq!(&result.data()[0..4], &[1, 1, 1, 255]);
        // Inside the rect the new content landed.
        let offset = (4 * 16 + 4) * 4;
        assert_eq!(&result.data()[offset..offset + 4], &[5, 5, 5, 255]);
    }

    #[test]
    fn full_gpu_update_skips_front_recopy() {
        let (queue, probe) = queue_with(CapacityPreset::Minimal, UploadMode::Gpu);
        let tile = TileHandle::new(0, 0);
        let back = TextureId(1);
        let front = TextureId(2);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(back), Some(front));
        probe.install_texture(front, Bitmap::new(SIZE));

        queue
            .try_enqueue(&request(tile, back), &Bitmap::new(SIZE))
            .unwrap();
        queue.drain(&mut tiles);

        assert!(!probe
            .events()
            .iter()
            .any(|e| matches!(e, BackendEvent::CopyTexture { .. })));
    }

    #[test]
    fn blit_bracket_opens_and_closes_once_per_drain() {
        let (queue, probe) = queue_with(CapacityPreset::Efficient, UploadMode::Gpu);
        let mut tiles = MapTiles::new();
        let frame = Bitmap::new(SIZE);
        for id in 0..3u64 {
            let tile = TileHandle::new(id as u32, 0);
            tiles.insert_tile(tile, Some(TextureId(id)), None);
            queue
                .try_enqueue(&request(tile, TextureId(id)), &frame)
                .unwrap();
        }

        queue.drain(&mut tiles);

        let events = probe.events();
        let begins = events
            .iter()
            .filter(|e| matches!(e, BackendEvent::BeginBlits))
            .count();
        let ends = events
            .iter()
            .filter(|e| matches!(e, BackendEvent::EndBlits))
            .count();
        assert_eq!(begins, 1);
        assert_eq!(ends, 1);
        assert!(matches!(events.last(), Some(BackendEvent::EndBlits)));
    }

    #[test]
    fn cpu_drain_never_opens_the_blit_bracket() {
        let (queue, probe) = queue_with(CapacityPreset::Minimal, UploadMode::Cpu);
        let tile = TileHandle::new(0, 0);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(TextureId(1)), None);

        queue
            .try_enqueue(&request(tile, TextureId(1)), &Bitmap::new(SIZE))
            .unwrap();
        queue.drain(&mut tiles);

        assert!(!probe
            .events()
            .iter()
            .any(|e| matches!(e, BackendEvent::BeginBlits | BackendEvent::EndBlits)));
    }

    #[test]
    fn pure_color_items_apply_and_clear() {
        let (queue, _probe) = queue_with(CapacityPreset::Minimal, UploadMode::Gpu);
        let tile = TileHandle::new(0, 0);
        let texture = TextureId(1);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(texture), None);

        let color = Rgba8::new(10, 20, 30, 255);
        queue.enqueue_pure_color(&request(tile, texture), color);

        let stats = queue.drain(&mut tiles);

        assert_eq!(stats.pure_color, 1);
        assert_eq!(tiles.flags(texture).pure_color, Some(color));
        assert_eq!(tiles.flags(texture).completed, 1);
        assert_eq!(queue.stats().pure_color, 0);
    }

    #[test]
    fn redraining_an_emptied_queue_is_a_noop() {
        let (queue, probe) = queue_with(CapacityPreset::Minimal, UploadMode::Gpu);
        let tile = TileHandle::new(0, 0);
        let mut tiles = MapTiles::new();
        tiles.insert_tile(tile, Some(TextureId(1)), None);

        queue
            .try_enqueue(&request(tile, TextureId(1)), &Bitmap::new(SIZE))
            .unwrap();
        queue.drain(&mut tiles);
        let consumed = probe.consumed();

        let stats = queue.drain(&mut tiles);

        assert!(stats.is_noop());
        assert_eq!(probe.consumed(), consumed);
        assert_eq!(tiles.flags(TextureId(1)).completed, 1);
    }
}
