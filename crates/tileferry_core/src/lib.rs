//! # TILEFERRY Core
//!
//! Bounded, double-buffered tile transfer pipeline:
//! - Fixed ring of transfer slots shared between one producer and one consumer
//! - GPU path through a double-buffered shared surface, CPU path through owned bitmaps
//! - Single-wait backpressure that never deadlocks across context loss
//!
//! ## Architecture Rules
//!
//! 1. **Bounded memory** - slot count is fixed at construction, never grown
//! 2. **Strict buffer correspondence** - every produced GPU frame is consumed
//!    exactly once, even when its tile has become obsolete
//! 3. **Oldest-first drain** - slots empty in the order they were filled
//!
//! ```text
//!   producer thread                      consumer thread
//!   ---------------                      ---------------
//!   try_enqueue ---> [ ring of slots ] ---> drain ---> destination
//!        |                  |                              textures
//!        '--- blocks when full, woken by drain / discard
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tileferry_core::{TransferConfig, TransferQueue};
//!
//! let queue = TransferQueue::new(TransferConfig::default(), backend);
//! // producer: queue.try_enqueue(&request, &frame)?;
//! // consumer: queue.drain(&mut tiles);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bitmap;
pub mod config;
pub mod error;
pub mod geom;
pub mod interop;
mod item;
pub mod queue;
mod ring;
pub mod stats;
pub mod testing;

pub use bitmap::Bitmap;
pub use config::{CapacityPreset, TransferConfig};
pub use error::{BackendError, ConfigError, EnqueueError};
pub use geom::{RectPx, Rgba8, SizePx};
pub use interop::{GpuBackend, TextureId, TileDirectory, TileHandle};
pub use item::{ItemStatus, TransferRequest, UploadMode};
pub use queue::TransferQueue;
pub use stats::{DrainStats, QueueStats};
