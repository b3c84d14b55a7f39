//! Test doubles for the collaborator traits.
//!
//! Shared by the unit tests, the integration suite and the bench, and
//! usable by embedders for their own harnesses. [`RecordingBackend`]
//! emulates the shared buffer with real pixel content so tests can assert
//! on what actually landed in a destination texture, not just on call
//! counts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bitmap::Bitmap;
use crate::error::BackendError;
use crate::geom::{RectPx, Rgba8, SizePx};
use crate::interop::{GpuBackend, TextureId, TileDirectory, TileHandle};

/// One observable backend call, recorded in invocation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    /// A frame was written into the shared buffer.
    Produce,
    /// The shared buffer advanced by one slot.
    Consume,
    /// Backing storage was requested for a destination texture.
    EnsureBacking(TextureId),
    /// Ambient state was saved before a run of blits.
    BeginBlits,
    /// A full texture-to-texture copy.
    CopyTexture {
        /// Source texture (the front texture being preserved).
        src: TextureId,
        /// Destination texture.
        dst: TextureId,
    },
    /// A copy from the current shared buffer slot.
    BlitFromShared {
        /// Destination texture.
        dst: TextureId,
        /// Invalidation rectangle, `None` for a full copy.
        inval: Option<RectPx>,
    },
    /// Ambient state was restored after the blit run.
    EndBlits,
    /// A CPU bitmap upload.
    Upload {
        /// Destination texture.
        dst: TextureId,
        /// Invalidation rectangle, `None` for a full upload.
        inval: Option<RectPx>,
    },
    /// The backend released its resources.
    Release,
}

#[derive(Default)]
struct RecordingState {
    produced: u64,
    consumed: u64,
    shared: VecDeque<Bitmap>,
    current: Option<Bitmap>,
    textures: HashMap<TextureId, Bitmap>,
    events: Vec<BackendEvent>,
    fail_produce: bool,
    released: bool,
}

/// A [`GpuBackend`] double that records calls and emulates pixel content.
///
/// Cloning yields a probe onto the same state, so a test can hand one
/// clone to the queue and keep the other for inspection.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Another handle onto the same recorded state.
    #[must_use]
    pub fn probe(&self) -> Self {
        self.clone()
    }

    /// Total successful produce calls.
    #[must_use]
    pub fn produced(&self) -> u64 {
        self.state.lock().produced
    }

    /// Total successful consume calls.
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.state.lock().consumed
    }

    /// True when every produce has been matched by a consume.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        let state = self.state.lock();
        state.produced == state.consumed
    }

    /// All recorded events so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<BackendEvent> {
        self.state.lock().events.clone()
    }

    /// Current content of a destination texture, if it has backing.
    #[must_use]
    pub fn texture(&self, id: TextureId) -> Option<Bitmap> {
        self.state.lock().textures.get(&id).cloned()
    }

    /// Pre-populates a destination texture with known content.
    pub fn install_texture(&self, id: TextureId, content: Bitmap) {
        self.state.lock().textures.insert(id, content);
    }

    /// Makes the next produce calls fail, emulating a rejected frame.
    pub fn set_fail_produce(&self, fail: bool) {
        self.state.lock().fail_produce = fail;
    }

    /// True once [`GpuBackend::release`] ran.
    #[must_use]
    pub fn released(&self) -> bool {
        self.state.lock().released
    }
}

impl GpuBackend for RecordingBackend {
    fn produce(&mut self, frame: &Bitmap) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(BackendError::Released);
        }
        if state.fail_produce {
            return Err(BackendError::NoBufferAvailable);
        }
        state.shared.push_back(frame.clone());
        state.produced += 1;
        state.events.push(BackendEvent::Produce);
        Ok(())
    }

    fn consume(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(BackendError::Released);
        }
        let Some(frame) = state.shared.pop_front() else {
            return Err(BackendError::OutOfSync {
                produced: state.produced,
                consumed: state.consumed,
            });
        };
        state.current = Some(frame);
        state.consumed += 1;
        state.events.push(BackendEvent::Consume);
        Ok(())
    }

    fn ensure_backing(&mut self, texture: TextureId, size: SizePx) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(BackendError::Released);
        }
        let needs_alloc = state
            .textures
            .get(&texture)
            .map_or(true, |existing| existing.size() != size);
        if needs_alloc {
            state.textures.insert(texture, Bitmap::new(size));
        }
        state.events.push(BackendEvent::EnsureBacking(texture));
        Ok(())
    }

    fn begin_blits(&mut self) {
        self.state.lock().events.push(BackendEvent::BeginBlits);
    }

    fn copy_texture(
        &mut self,
        src: TextureId,
        dst: TextureId,
        _size: SizePx,
    ) -> Result<(), BackendError> {
        let state = &mut *self.state.lock();
        let source = state
            .textures
            .get(&src)
            .cloned()
            .ok_or(BackendError::UnknownTexture(src))?;
        state
            .textures
            .get_mut(&dst)
            .ok_or(BackendError::UnknownTexture(dst))?
            .copy_from(&source);
        state.events.push(BackendEvent::CopyTexture { src, dst });
        Ok(())
    }

    fn blit_from_shared(
        &mut self,
        dst: TextureId,
        _size: SizePx,
        inval: Option<RectPx>,
    ) -> Result<(), BackendError> {
        let state = &mut *self.state.lock();
        let RecordingState {
            current,
            textures,
            events,
            produced,
            consumed,
            ..
        } = state;
        let Some(source) = current.as_ref() else {
            return Err(BackendError::OutOfSync {
                produced: *produced,
                consumed: *consumed,
            });
        };
        let target = textures
            .get_mut(&dst)
            .ok_or(BackendError::UnknownTexture(dst))?;
        match inval {
            Some(rect) => target.copy_rect_from(source, rect),
            None => target.copy_from(source),
        }
        events.push(BackendEvent::BlitFromShared { dst, inval });
        Ok(())
    }

    fn end_blits(&mut self) {
        self.state.lock().events.push(BackendEvent::EndBlits);
    }

    fn upload(
        &mut self,
        dst: TextureId,
        frame: &Bitmap,
        inval: Option<RectPx>,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let target = state
            .textures
            .get_mut(&dst)
            .ok_or(BackendError::UnknownTexture(dst))?;
        match inval {
            Some(rect) => target.copy_rect_from(frame, rect),
            None => target.copy_from(frame),
        }
        state.events.push(BackendEvent::Upload { dst, inval });
        Ok(())
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        if state.released {
            return;
        }
        state.released = true;
        state.shared.clear();
        state.current = None;
        state.textures.clear();
        state.events.push(BackendEvent::Release);
    }
}

#[derive(Debug, Default)]
struct TileEntry {
    back: Option<TextureId>,
    front: Option<TextureId>,
    dropped_back: u32,
    failed: u32,
}

/// Per-texture flags mutated by the consumer during drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureFlags {
    /// Solid-color state, if set.
    pub pure_color: Option<Rgba8>,
    /// True once the texture was marked not-pure.
    pub not_pure: bool,
    /// Number of transfer-complete notifications.
    pub completed: u32,
}

/// An in-memory [`TileDirectory`] double.
#[derive(Debug, Default)]
pub struct MapTiles {
    tiles: HashMap<TileHandle, TileEntry>,
    textures: HashMap<TextureId, TextureFlags>,
}

impl MapTiles {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tile with its current back and front textures.
    pub fn insert_tile(
        &mut self,
        tile: TileHandle,
        back: Option<TextureId>,
        front: Option<TextureId>,
    ) {
        self.tiles.insert(
            tile,
            TileEntry {
                back,
                front,
                ..TileEntry::default()
            },
        );
    }

    /// Reassigns the tile's back texture, emulating recycling.
    pub fn set_back_texture(&mut self, tile: TileHandle, back: Option<TextureId>) {
        if let Some(entry) = self.tiles.get_mut(&tile) {
            entry.back = back;
        }
    }

    /// Removes the tile entirely, emulating destruction.
    pub fn remove_tile(&mut self, tile: TileHandle) {
        self.tiles.remove(&tile);
    }

    /// Flags recorded for a texture (default flags when untouched).
    #[must_use]
    pub fn flags(&self, texture: TextureId) -> TextureFlags {
        self.textures.get(&texture).copied().unwrap_or_default()
    }

    /// How often the tile's back texture was dropped for repaint.
    #[must_use]
    pub fn dropped_back(&self, tile: TileHandle) -> u32 {
        self.tiles.get(&tile).map_or(0, |entry| entry.dropped_back)
    }

    /// How often the tile was marked transfer-failed.
    #[must_use]
    pub fn failed(&self, tile: TileHandle) -> u32 {
        self.tiles.get(&tile).map_or(0, |entry| entry.failed)
    }
}

impl TileDirectory for MapTiles {
    fn back_texture(&self, tile: TileHandle) -> Option<TextureId> {
        self.tiles.get(&tile).and_then(|entry| entry.back)
    }

    fn front_texture(&self, tile: TileHandle) -> Option<TextureId> {
        self.tiles.get(&tile).and_then(|entry| entry.front)
    }

    fn drop_back_texture(&mut self, tile: TileHandle) {
        if let Some(entry) = self.tiles.get_mut(&tile) {
            entry.back = None;
            entry.dropped_back += 1;
        }
    }

    fn mark_transfer_failed(&mut self, tile: TileHandle) {
        if let Some(entry) = self.tiles.get_mut(&tile) {
            entry.failed += 1;
        }
    }

    fn set_pure_color(&mut self, texture: TextureId, color: Rgba8) {
        let flags = self.textures.entry(texture).or_default();
        flags.pure_color = Some(color);
    }

    fn set_not_pure(&mut self, texture: TextureId) {
        let flags = self.textures.entry(texture).or_default();
        flags.pure_color = None;
        flags.not_pure = true;
    }

    fn mark_transfer_complete(&mut self, texture: TextureId) {
        self.textures.entry(texture).or_default().completed += 1;
    }
}
