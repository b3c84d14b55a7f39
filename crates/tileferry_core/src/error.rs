//! Error types for the transfer pipeline.
//!
//! Nothing here is fatal to the process: the worst outcome of any error is
//! a tile re-render.

use thiserror::Error;

use crate::geom::SizePx;
use crate::interop::TextureId;

/// Errors surfaced to the producer by the enqueue path.
///
/// Every variant is non-fatal; the caller is expected to mark the tile's
/// texture transfer-failed so the scheduler repaints it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    /// A removal/teardown operation interrupted the wait for a free slot.
    #[error("enqueue interrupted by a concurrent removal operation")]
    Interrupted,

    /// The GPU context is unavailable; no content is being accepted.
    #[error("gpu context unavailable")]
    ContextLost,

    /// The shared buffer rejected the produced frame.
    #[error("shared buffer rejected frame: {0}")]
    ProduceFailed(#[source] BackendError),
}

/// Errors reported by a [`crate::interop::GpuBackend`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// `consume` was called with no produced buffer outstanding.
    ///
    /// Indicates the produce/consume correspondence has been broken.
    #[error("shared buffer out of sync: produced {produced}, consumed {consumed}")]
    OutOfSync {
        /// Total produce calls observed.
        produced: u64,
        /// Total consume calls observed.
        consumed: u64,
    },

    /// No shared buffer slot was available to produce into.
    #[error("no shared buffer slot available")]
    NoBufferAvailable,

    /// The destination texture has no backing storage.
    #[error("unknown destination texture {0:?}")]
    UnknownTexture(TextureId),

    /// Frame dimensions do not match the shared buffer geometry.
    #[error("frame size {got:?} does not match buffer geometry {want:?}")]
    GeometryMismatch {
        /// Dimensions of the offered frame.
        got: SizePx,
        /// Dimensions the shared buffer was bound with.
        want: SizePx,
    },

    /// The backend has already been released.
    #[error("backend already released")]
    Released,
}

/// Errors from parsing a [`crate::config::TransferConfig`].
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// The TOML source did not parse or did not match the schema.
    #[error("invalid transfer config: {0}")]
    Parse(#[from] toml::de::Error),
}
