//! # TILEFERRY GPU
//!
//! wgpu-backed transfer backend for the tileferry pipeline:
//! - Frames are staged through a fixed pool of `Rgba8Unorm` textures
//! - Blits between staging slots and tile textures record onto one encoder
//!   per drain and submit as a single batch
//! - Submission order on the shared `wgpu::Queue` is the only fence
//!
//! ## Architecture Rules
//!
//! 1. **No GPU waits** - nothing here blocks on device completion
//! 2. **Fixed footprint** - the staging pool is allocated once and never grows
//! 3. **Geometry is law** - every staged frame matches the pool geometry

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

mod backend;
mod slots;

pub use backend::WgpuTransferBackend;
