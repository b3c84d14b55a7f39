//! The wgpu implementation of the transfer backend.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use tileferry_core::{BackendError, Bitmap, GpuBackend, RectPx, SizePx, TextureId};

use crate::slots::SlotCounters;

/// Staging slots kept beyond the queue's ring capacity, so a produce can
/// land while older frames are still waiting on their blit.
const EXTRA_SLACK: usize = 2;

/// A [`GpuBackend`] that stages frames through a pool of wgpu textures.
///
/// All copies are recorded on one `wgpu::Queue`; its submission order is the
/// only synchronization between an upload and the blit that reads it.
pub struct WgpuTransferBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    geometry: SizePx,
    pool: Vec<wgpu::Texture>,
    counters: SlotCounters,
    backing: HashMap<TextureId, wgpu::Texture>,
    encoder: Option<wgpu::CommandEncoder>,
    released: bool,
}

impl WgpuTransferBackend {
    /// Creates a backend with `ring_capacity + EXTRA_SLACK` staging slots of
    /// the given tile geometry.
    ///
    /// # Panics
    /// Panics when `ring_capacity` is zero or `geometry` is empty.
    #[must_use]
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        geometry: SizePx,
        ring_capacity: usize,
    ) -> Self {
        assert!(!geometry.is_empty(), "tile geometry must be non-empty");
        let len = ring_capacity + EXTRA_SLACK;
        let pool = (0..len)
            .map(|slot| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("tileferry staging slot {slot}")),
                    size: extent(geometry.width, geometry.height),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            })
            .collect();
        debug!(slots = len, ?geometry, "created staging pool");
        Self {
            device,
            queue,
            geometry,
            pool,
            counters: SlotCounters::new(len),
            backing: HashMap::new(),
            encoder: None,
            released: false,
        }
    }

    /// Fixed geometry every staged frame must match.
    #[must_use]
    pub const fn geometry(&self) -> SizePx {
        self.geometry
    }

    /// Takes the pending blit encoder, creating one when none is open.
    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("tileferry blit encoder"),
                }),
        }
    }

    fn backing_texture(&self, id: TextureId) -> Result<&wgpu::Texture, BackendError> {
        self.backing
            .get(&id)
            .ok_or(BackendError::UnknownTexture(id))
    }

    fn out_of_sync(&self) -> BackendError {
        BackendError::OutOfSync {
            produced: self.counters.produced(),
            consumed: self.counters.consumed(),
        }
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn copy_site(texture: &wgpu::Texture, x: u32, y: u32) -> wgpu::ImageCopyTexture<'_> {
    wgpu::ImageCopyTexture {
        texture,
        mip_level: 0,
        origin: wgpu::Origin3d { x, y, z: 0 },
        aspect: wgpu::TextureAspect::All,
    }
}

/// Byte layout of a sub-rectangle inside a full-width RGBA8 bitmap.
fn rect_layout(full_width: u32, rect: RectPx) -> wgpu::ImageDataLayout {
    wgpu::ImageDataLayout {
        offset: u64::from(rect.y) * u64::from(full_width) * 4 + u64::from(rect.x) * 4,
        bytes_per_row: Some(full_width * 4),
        rows_per_image: Some(rect.height),
    }
}

impl GpuBackend for WgpuTransferBackend {
    fn produce(&mut self, frame: &Bitmap) -> Result<(), BackendError> {
        if self.released {
            return Err(BackendError::Released);
        }
        if frame.size() != self.geometry {
            return Err(BackendError::GeometryMismatch {
                got: frame.size(),
                want: self.geometry,
            });
        }
        let Some(slot) = self.counters.produce_slot() else {
            return Err(BackendError::NoBufferAvailable);
        };
        self.queue.write_texture(
            copy_site(&self.pool[slot], 0, 0),
            frame.data(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.geometry.width * 4),
                rows_per_image: Some(self.geometry.height),
            },
            extent(self.geometry.width, self.geometry.height),
        );
        trace!(slot, "staged frame");
        Ok(())
    }

    fn consume(&mut self) -> Result<(), BackendError> {
        if self.released {
            return Err(BackendError::Released);
        }
        match self.counters.consume_slot() {
            Some(slot) => {
                trace!(slot, "advanced read slot");
                Ok(())
            }
            None => Err(self.out_of_sync()),
        }
    }

    fn ensure_backing(&mut self, texture: TextureId, size: SizePx) -> Result<(), BackendError> {
        if self.released {
            return Err(BackendError::Released);
        }
        let fits = self
            .backing
            .get(&texture)
            .is_some_and(|existing| existing.width() == size.width && existing.height() == size.height);
        if !fits {
            let allocated = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("tileferry tile texture {}", texture.0)),
                size: extent(size.width, size.height),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            self.backing.insert(texture, allocated);
            debug!(texture = texture.0, ?size, "allocated tile backing");
        }
        Ok(())
    }

    fn begin_blits(&mut self) {
        if self.released {
            return;
        }
        let encoder = self.take_encoder();
        self.encoder = Some(encoder);
    }

    fn copy_texture(
        &mut self,
        src: TextureId,
        dst: TextureId,
        size: SizePx,
    ) -> Result<(), BackendError> {
        if self.released {
            return Err(BackendError::Released);
        }
        let mut encoder = self.take_encoder();
        let outcome = match (self.backing_texture(src), self.backing_texture(dst)) {
            (Ok(source), Ok(target)) => {
                encoder.copy_texture_to_texture(
                    copy_site(source, 0, 0),
                    copy_site(target, 0, 0),
                    extent(size.width, size.height),
                );
                Ok(())
            }
            (Err(err), _) | (_, Err(err)) => Err(err),
        };
        self.encoder = Some(encoder);
        outcome
    }

    fn blit_from_shared(
        &mut self,
        dst: TextureId,
        size: SizePx,
        inval: Option<RectPx>,
    ) -> Result<(), BackendError> {
        if self.released {
            return Err(BackendError::Released);
        }
        let Some(slot) = self.counters.current_slot() else {
            return Err(self.out_of_sync());
        };
        let (x, y, copy_extent) = match inval {
            Some(rect) => (rect.x, rect.y, extent(rect.width, rect.height)),
            None => (0, 0, extent(size.width, size.height)),
        };
        let mut encoder = self.take_encoder();
        let outcome = match self.backing_texture(dst) {
            Ok(target) => {
                encoder.copy_texture_to_texture(
                    copy_site(&self.pool[slot], x, y),
                    copy_site(target, x, y),
                    copy_extent,
                );
                Ok(())
            }
            Err(err) => Err(err),
        };
        self.encoder = Some(encoder);
        outcome
    }

    fn end_blits(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
            trace!("submitted blit pass");
        }
    }

    fn upload(
        &mut self,
        dst: TextureId,
        frame: &Bitmap,
        inval: Option<RectPx>,
    ) -> Result<(), BackendError> {
        if self.released {
            return Err(BackendError::Released);
        }
        let target = self.backing_texture(dst)?;
        let size = frame.size();
        let (site, layout, copy_extent) = match inval {
            Some(rect) => (
                copy_site(target, rect.x, rect.y),
                rect_layout(size.width, rect),
                extent(rect.width, rect.height),
            ),
            None => (
                copy_site(target, 0, 0),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(size.width * 4),
                    rows_per_image: Some(size.height),
                },
                extent(size.width, size.height),
            ),
        };
        self.queue.write_texture(site, frame.data(), layout, copy_extent);
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.encoder = None;
        self.pool.clear();
        self.backing.clear();
        debug!("released staging pool");
    }
}
