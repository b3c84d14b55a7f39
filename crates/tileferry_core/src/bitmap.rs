//! Owned RGBA8 pixel buffers ferried through the queue.
//!
//! Transfer slots keep their `Bitmap` allocation alive across reuse so that
//! steady-state CPU uploads do not reallocate every frame.

use bytemuck::bytes_of;

use crate::geom::{RectPx, Rgba8, SizePx};

/// A tightly packed RGBA8 pixel buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    size: SizePx,
    data: Vec<u8>,
}

impl Bitmap {
    /// Creates a zero-filled bitmap of the given size.
    #[must_use]
    pub fn new(size: SizePx) -> Self {
        Self {
            size,
            data: vec![0; size.rgba8_len()],
        }
    }

    /// Wraps an existing pixel buffer.
    ///
    /// Returns `None` when `data` does not match the RGBA8 length of `size`.
    #[must_use]
    pub fn from_vec(size: SizePx, data: Vec<u8>) -> Option<Self> {
        if data.len() != size.rgba8_len() {
            return None;
        }
        Some(Self { size, data })
    }

    /// Creates a bitmap filled with a solid color.
    #[must_use]
    pub fn solid(size: SizePx, color: Rgba8) -> Self {
        let mut bitmap = Self::new(size);
        bitmap.fill(color);
        bitmap
    }

    /// Bitmap dimensions.
    #[must_use]
    pub const fn size(&self) -> SizePx {
        self.size
    }

    /// Raw pixel bytes, row-major RGBA8.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw pixel bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Overwrites every pixel with `color`.
    pub fn fill(&mut self, color: Rgba8) {
        for pixel in self.data.chunks_exact_mut(4) {
            pixel.copy_from_slice(bytes_of(&color));
        }
    }

    /// Copies all pixels of `src` into this bitmap.
    ///
    /// When the dimensions already match, the existing allocation is reused;
    /// otherwise the buffer is resized to fit.
    pub fn copy_from(&mut self, src: &Bitmap) {
        if self.size != src.size {
            self.size = src.size;
            self.data.resize(src.size.rgba8_len(), 0);
        }
        self.data.copy_from_slice(&src.data);
    }

    /// Copies the pixels of `rect` from `src` into the same rectangle here.
    ///
    /// Both bitmaps must share dimensions and the rectangle must lie inside
    /// them; out-of-range rows or columns are clipped away.
    pub fn copy_rect_from(&mut self, src: &Bitmap, rect: RectPx) {
        debug_assert_eq!(self.size, src.size);
        let width = rect.width.min(self.size.width.saturating_sub(rect.x)) as usize;
        let y_end = rect.y.saturating_add(rect.height).min(self.size.height);
        if width == 0 {
            return;
        }
        let stride = self.size.width as usize * 4;
        for y in rect.y..y_end {
            let start = y as usize * stride + rect.x as usize * 4;
            let end = start + width * 4;
            self.data[start..end].copy_from_slice(&src.data[start..end]);
        }
    }
}
