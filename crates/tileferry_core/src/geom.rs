//! Pixel-space geometry shared between producer and consumer.
//!
//! These are the canonical representations carried through the queue;
//! collaborator backends translate them into their own API's types.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Texture / bitmap dimensions in pixels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct SizePx {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl SizePx {
    /// Creates a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Byte length of an RGBA8 buffer of this size.
    #[must_use]
    pub const fn rgba8_len(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Axis-aligned pixel rectangle, origin at the top-left of the tile.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct RectPx {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl RectPx {
    /// Creates a new rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when the rectangle has no area.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Rectangle size.
    #[must_use]
    pub const fn size(self) -> SizePx {
        SizePx::new(self.width, self.height)
    }

    /// True when this rectangle covers strictly less than `size`.
    ///
    /// A partial update leaves pixels outside the rectangle untouched, which
    /// is what forces the front-texture recopy on the GPU blit path.
    #[must_use]
    pub const fn is_strict_subregion_of(self, size: SizePx) -> bool {
        !(self.x == 0
            && self.y == 0
            && self.width >= size.width
            && self.height >= size.height)
    }
}

/// A solid RGBA8 color, used by the pure-color fast path.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct Rgba8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8 {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    /// Opaque white.
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    /// Creates a new color.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Converts to a `[r, g, b, a]` byte array.
    #[must_use]
    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}
