//! Sample-size selection.
//!
//! A sample size is the integer downsample factor applied by the decoder:
//! 2 decodes every other pixel on each axis, 4 every fourth, and so on.
//! Region decoders only accept powers of two.

use std::fmt;

use serde::Serialize;

use crate::geometry::IntSize;

/// Power-of-two downsample factor (1, 2, 4, 8, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SampleSize(u32);

impl SampleSize {
    /// Full resolution.
    pub const ONE: SampleSize = SampleSize(1);

    /// Create a sample size, rounding down to the nearest power of two.
    ///
    /// Zero is treated as 1.
    pub fn new(size: u32) -> Self {
        if size <= 1 {
            Self::ONE
        } else {
            SampleSize(1 << (31 - size.leading_zeros()))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// The next finer sample size, or `None` at full resolution.
    pub fn halved(self) -> Option<SampleSize> {
        (self.0 > 1).then(|| SampleSize(self.0 / 2))
    }

    /// Largest sample size worth requesting for an image: anything coarser
    /// would shrink its shorter side below one pixel.
    pub fn ceiling_for(image_size: IntSize) -> SampleSize {
        SampleSize::new(image_size.min_dimension())
    }

    /// Select the coarsest sample size that still keeps at least one decoded
    /// pixel per screen pixel at `scale`.
    ///
    /// This is the largest power of two `s` with `s <= 1 / scale`, clamped to
    /// `1..=ceiling_for(image_size)`. Zooming in never coarsens the result.
    pub fn for_scale(scale: f32, image_size: IntSize) -> SampleSize {
        let ceiling = Self::ceiling_for(image_size);
        if !scale.is_finite() || scale <= 0.0 {
            return ceiling;
        }
        if scale >= 1.0 {
            return Self::ONE;
        }

        let exponent = (1.0 / scale).log2().floor();
        if exponent >= ceiling.0.trailing_zeros() as f32 {
            ceiling
        } else {
            SampleSize(1 << exponent as u32)
        }
    }

    /// Sample size for showing the whole image fitted inside `canvas_size`.
    ///
    /// The decoded image stays below twice the canvas size on each axis.
    pub fn for_canvas(canvas_size: IntSize, image_size: IntSize) -> SampleSize {
        if canvas_size.is_empty() || image_size.is_empty() {
            return Self::ONE;
        }
        let zoom = f32::min(
            canvas_size.width as f32 / image_size.width as f32,
            canvas_size.height as f32 / image_size.height as f32,
        );
        Self::for_scale(zoom, image_size)
    }
}

impl Default for SampleSize {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for SampleSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
