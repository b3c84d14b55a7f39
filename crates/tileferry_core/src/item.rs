//! Transfer items: one unit of pending tile content awaiting consumption.

use serde::{Deserialize, Serialize};

use crate::bitmap::Bitmap;
use crate::geom::{RectPx, Rgba8, SizePx};
use crate::interop::{TextureId, TileHandle};

/// Lifecycle state of a transfer slot.
///
/// Legal transitions are `Empty → PendingBlit → Empty` and
/// `Empty → PendingBlit → PendingDiscard → Empty`; nothing else.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ItemStatus {
    /// Slot holds no content.
    #[default]
    Empty,
    /// Content is waiting to be copied into its destination texture.
    PendingBlit,
    /// Content has been abandoned but its shared-buffer correspondence
    /// still has to be resolved on the consumer thread.
    PendingDiscard,
}

/// How enqueued content travels to its destination texture.
///
/// Fixed per item at enqueue time, snapshotting the queue-wide mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Hand-off through the shared GPU buffer, no CPU-side copy.
    #[default]
    Gpu,
    /// Direct bitmap upload from an owned CPU payload.
    Cpu,
}

/// What the producer hands over per rendered tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    /// Tile the content belongs to. Identity only; never dereferenced here.
    pub tile: TileHandle,
    /// The specific texture instance the content was generated for.
    pub texture: TextureId,
    /// Full content dimensions.
    pub content_size: SizePx,
    /// Updated sub-area; `None` means a full-texture update.
    pub inval: Option<RectPx>,
}

/// A degenerate solid-color transfer that bypasses the shared buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PureColorItem {
    pub(crate) tile: TileHandle,
    pub(crate) texture: TextureId,
    pub(crate) color: Rgba8,
}

/// One slot of the transfer ring.
#[derive(Debug, Default)]
pub(crate) struct TransferItem {
    status: ItemStatus,
    mode: UploadMode,
    tile: Option<TileHandle>,
    texture: Option<TextureId>,
    content_size: SizePx,
    inval: Option<RectPx>,
    /// Lazily allocated, kept across [`Self::reset`] for reuse.
    payload: Option<Bitmap>,
}

impl TransferItem {
    pub(crate) fn status(&self) -> ItemStatus {
        self.status
    }

    pub(crate) fn mode(&self) -> UploadMode {
        self.mode
    }

    pub(crate) fn tile(&self) -> Option<TileHandle> {
        self.tile
    }

    pub(crate) fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub(crate) fn content_size(&self) -> SizePx {
        self.content_size
    }

    pub(crate) fn inval(&self) -> Option<RectPx> {
        self.inval
    }

    pub(crate) fn payload(&self) -> Option<&Bitmap> {
        self.payload.as_ref()
    }

    /// Publishes `request` into this slot as pending content.
    pub(crate) fn publish(&mut self, request: &TransferRequest, mode: UploadMode) {
        self.status = ItemStatus::PendingBlit;
        self.mode = mode;
        self.tile = Some(request.tile);
        self.texture = Some(request.texture);
        self.content_size = request.content_size;
        self.inval = request.inval.filter(|rect| !rect.is_empty());
    }

    /// Copies `frame` into the owned payload, reusing the prior allocation
    /// when the dimensions match.
    pub(crate) fn attach_payload(&mut self, frame: &Bitmap) {
        match &mut self.payload {
            Some(payload) => payload.copy_from(frame),
            None => self.payload = Some(frame.clone()),
        }
    }

    /// Marks pending content for discard.
    pub(crate) fn mark_discard(&mut self) {
        debug_assert_eq!(self.status, ItemStatus::PendingBlit);
        self.status = ItemStatus::PendingDiscard;
    }

    /// Returns the slot to `Empty`, dropping the back-references but
    /// keeping the payload allocation.
    pub(crate) fn reset(&mut self) {
        self.status = ItemStatus::Empty;
        self.tile = None;
        self.texture = None;
        self.inval = None;
    }
}
