//! Collaborator surface between the queue and the tile/GPU subsystems.
//!
//! The queue never owns tiles or destination textures. It holds non-owning
//! handles to both and compares them for identity only; every dereference
//! goes through the [`TileDirectory`] passed in by the consumer thread, and
//! every graphics operation goes through the [`GpuBackend`] installed at
//! construction time.

use crate::bitmap::Bitmap;
use crate::error::BackendError;
use crate::geom::{RectPx, Rgba8, SizePx};

/// Generation-checked handle to a tile owned by an external registry.
///
/// The generation makes a recycled registry slot observable: a stale handle
/// no longer resolves, which is what the obsolescence check relies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileHandle {
    index: u32,
    generation: u32,
}

impl TileHandle {
    /// Creates a handle from a registry slot index and its generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Registry slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Registry slot generation at hand-out time.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Opaque identity of one texture instance.
///
/// Used only for equality: a tile whose current back texture differs from
/// the identity saved at enqueue time has been recycled underneath the
/// in-flight transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Tile/texture ownership surface consumed during drain and teardown.
///
/// Implemented by the external tile subsystem. All methods are invoked on
/// the consumer thread while the queue lock is held, so implementations
/// must not call back into the queue.
pub trait TileDirectory {
    /// Current back (being-written) texture of `tile`, if the tile is alive.
    fn back_texture(&self, tile: TileHandle) -> Option<TextureId>;

    /// Current front (displayed) texture of `tile`, if any.
    fn front_texture(&self, tile: TileHandle) -> Option<TextureId>;

    /// Drops the tile's back texture so the tile is repainted and
    /// retransferred.
    fn drop_back_texture(&mut self, tile: TileHandle);

    /// Marks the tile's pending transfer as failed, triggering reschedule.
    fn mark_transfer_failed(&mut self, tile: TileHandle);

    /// Puts the destination texture into solid-color state.
    fn set_pure_color(&mut self, texture: TextureId, color: Rgba8);

    /// Clears the destination texture's solid-color state.
    fn set_not_pure(&mut self, texture: TextureId);

    /// Marks the destination texture's content transfer complete.
    fn mark_transfer_complete(&mut self, texture: TextureId);
}

/// GPU-side transfer primitives, owned by the queue.
///
/// Wraps the shared multi-buffered GPU resource plus the two copy
/// primitives. Each `produce` call must be matched by exactly one `consume`
/// call, including for content that is ultimately discarded; the queue is
/// responsible for maintaining that correspondence and the backend is
/// expected to report (not repair) violations.
pub trait GpuBackend: Send {
    /// Writes a rendered frame into the shared buffer's next slot.
    ///
    /// Called on the producer thread under the queue lock. Failure aborts
    /// the enqueue without consuming a transfer slot.
    fn produce(&mut self, frame: &Bitmap) -> Result<(), BackendError>;

    /// Advances the shared buffer by one slot, binding it as blit source.
    ///
    /// Called on the consumer thread once per GPU-mode item processed,
    /// pending or discarded.
    fn consume(&mut self) -> Result<(), BackendError>;

    /// Guarantees the destination texture has backing storage of `size`.
    fn ensure_backing(&mut self, texture: TextureId, size: SizePx) -> Result<(), BackendError>;

    /// Saves ambient graphics state before a run of blits.
    ///
    /// Called at most once per drain, and only when at least one GPU blit
    /// happens.
    fn begin_blits(&mut self);

    /// Full-texture copy from `src` into `dst`.
    ///
    /// Used to recopy the front texture before a partial update so pixels
    /// outside the invalidation rectangle are preserved.
    fn copy_texture(
        &mut self,
        src: TextureId,
        dst: TextureId,
        size: SizePx,
    ) -> Result<(), BackendError>;

    /// Copies from the current shared buffer slot into `dst`.
    ///
    /// `inval` of `None` copies the full `size`; otherwise only the
    /// rectangle is written.
    fn blit_from_shared(
        &mut self,
        dst: TextureId,
        size: SizePx,
        inval: Option<RectPx>,
    ) -> Result<(), BackendError>;

    /// Restores the ambient graphics state saved by [`Self::begin_blits`].
    fn end_blits(&mut self);

    /// Uploads CPU bitmap content into `dst`, honoring `inval`.
    fn upload(
        &mut self,
        dst: TextureId,
        frame: &Bitmap,
        inval: Option<RectPx>,
    ) -> Result<(), BackendError>;

    /// Releases the shared buffer and any ancillary GPU resources.
    ///
    /// Idempotent; called on teardown and again from the queue destructor.
    fn release(&mut self);
}
