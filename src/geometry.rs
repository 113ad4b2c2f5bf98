//! Geometry primitives shared by the tile grid, the composer and the UI layer.
//!
//! Image-space values are integral (`IntSize`, `IntRect`) because regions are
//! handed to a decoder that works on whole pixels. Screen-space values are
//! floating point (`Rect`, `Offset`, `ScaleFactor`) because they come from a
//! continuous zoom/pan transformation.

use std::fmt;

use serde::Serialize;

// =============================================================================
// Integer geometry (image space)
// =============================================================================

/// Width and height in whole pixels.
///
/// Used both for the unscaled size of the source image and for the size of
/// the viewport canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IntSize {
    pub width: u32,
    pub height: u32,
}

impl IntSize {
    pub const ZERO: IntSize = IntSize {
        width: 0,
        height: 0,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn min_dimension(&self) -> u32 {
        self.width.min(self.height)
    }

    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Area in pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for IntSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle in unscaled image pixels.
///
/// `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IntRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl IntRect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle anchored at the origin covering `size`.
    pub const fn from_size(size: IntSize) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn size(&self) -> IntSize {
        IntSize::new(self.width(), self.height())
    }

    pub fn area(&self) -> u64 {
        self.size().area()
    }

    /// Whether this rectangle lies entirely within `0..size`.
    pub fn fits_within(&self, size: IntSize) -> bool {
        self.left <= self.right
            && self.top <= self.bottom
            && self.right <= size.width
            && self.bottom <= size.height
    }

    /// Whether the interiors of two rectangles intersect.
    pub fn overlaps(&self, other: &IntRect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Map to screen space: scale around the origin, then translate.
    pub fn scaled_and_offset_by(&self, scale: ScaleFactor, offset: Offset) -> Rect {
        Rect {
            left: self.left as f32 * scale.x + offset.x,
            top: self.top as f32 * scale.y + offset.y,
            right: self.right as f32 * scale.x + offset.x,
            bottom: self.bottom as f32 * scale.y + offset.y,
        }
    }
}

impl fmt::Display for IntRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

// =============================================================================
// Float geometry (screen space)
// =============================================================================

/// Translation in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Per-axis zoom factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleFactor {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactor {
    pub const IDENTITY: ScaleFactor = ScaleFactor { x: 1.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const fn uniform(scale: f32) -> Self {
        Self::new(scale, scale)
    }

    /// The larger of the two axes, i.e. the worst case for memory.
    pub fn max_scale(&self) -> f32 {
        self.x.max(self.y)
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rectangle in screen pixels. `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Whether this rectangle intersects the canvas `(0, 0, width, height)`.
    ///
    /// Touching edges do not count as an overlap.
    pub fn overlaps_canvas(&self, canvas: IntSize) -> bool {
        self.right > 0.0
            && self.left < canvas.width as f32
            && self.bottom > 0.0
            && self.top < canvas.height as f32
    }
}
