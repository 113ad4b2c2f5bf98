//! Multi-resolution tile grid.
//!
//! For a given canvas and image size the grid holds:
//!
//! - a **base tile**: the whole image decoded at the coarsest useful sample
//!   size, kept resident as a low-resolution fallback;
//! - **foreground tiles**: for every finer sample size down to 1, an exact
//!   tiling of the image whose cells decode to roughly half the canvas.
//!
//! ```text
//!   sample size 4 (base)      sample size 2          sample size 1
//!  ┌──────────────────┐   ┌────┬────┬────┬──┐   ┌──┬──┬──┬──┬──┬──┬──┬─┐
//!  │                  │   │    │    │    │  │   ├──┼──┼──┼──┼──┼──┼──┼─┤
//!  │    whole image   │   ├────┼────┼────┼──┤   ├──┼──┼──┼──┼──┼──┼──┼─┤
//!  │                  │   │    │    │    │  │   ├──┼──┼──┼──┼──┼──┼──┼─┤
//!  └──────────────────┘   └────┴────┴────┴──┘   └──┴──┴──┴──┴──┴──┴──┴─┘
//! ```
//!
//! The last row and column of every level absorb the remainder, so edge tiles
//! can be larger than the nominal cell but never leave a gap.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::geometry::{IntRect, IntSize};

use super::sample_size::SampleSize;

/// Smallest decoded cell edge. Keeps tiny canvases from exploding the grid.
pub const MIN_DECODED_TILE_SIZE: u32 = 256;

// =============================================================================
// Bitmap Region Tile
// =============================================================================

/// One independently decodable region of the image at one sample size.
///
/// This is the cache key of [`super::TileCache`]; equality is structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BitmapRegionTile {
    /// Region in unscaled image pixels
    pub region: IntRect,

    /// Downsample factor applied when decoding `region`
    pub sample_size: SampleSize,
}

impl BitmapRegionTile {
    pub fn new(region: IntRect, sample_size: SampleSize) -> Self {
        Self {
            region,
            sample_size,
        }
    }

    /// Size of the bitmap produced by decoding this tile.
    ///
    /// Rounds up so that a non-empty region never decodes to zero pixels.
    pub fn decoded_size(&self) -> IntSize {
        let s = self.sample_size.get();
        IntSize::new(
            self.region.width().div_ceil(s),
            self.region.height().div_ceil(s),
        )
    }
}

// =============================================================================
// Tile Grid
// =============================================================================

/// Static tile layout for one (canvas size, image size) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileGrid {
    image_size: IntSize,
    base: BitmapRegionTile,
    foreground: BTreeMap<SampleSize, Vec<BitmapRegionTile>>,
}

impl TileGrid {
    /// Build the grid. Pure and deterministic.
    pub fn generate(canvas_size: IntSize, image_size: IntSize) -> Self {
        let base_sample_size = SampleSize::for_canvas(canvas_size, image_size);
        let base = BitmapRegionTile::new(IntRect::from_size(image_size), base_sample_size);

        // Decoded cells aim for half the canvas on each axis.
        let min_tile_size = IntSize::new(
            (canvas_size.width / 2).max(MIN_DECODED_TILE_SIZE),
            (canvas_size.height / 2).max(MIN_DECODED_TILE_SIZE),
        );

        let mut foreground = BTreeMap::new();
        let mut next = base_sample_size.halved();
        while let Some(sample_size) = next {
            // No level whose narrowest tile would decode below one pixel.
            if image_size.min_dimension() >= sample_size.get() {
                let tiles = tile_level(image_size, min_tile_size, sample_size);
                foreground.insert(sample_size, tiles);
            }
            next = sample_size.halved();
        }

        Self {
            image_size,
            base,
            foreground,
        }
    }

    pub fn image_size(&self) -> IntSize {
        self.image_size
    }

    /// Whole-image fallback tile.
    pub fn base(&self) -> &BitmapRegionTile {
        &self.base
    }

    /// Foreground tiles for `sample_size`, in row-major order.
    ///
    /// Empty when no level exists for that sample size, which happens when
    /// the viewport is zoomed out past the base tile's resolution.
    pub fn foreground(&self, sample_size: SampleSize) -> &[BitmapRegionTile] {
        self.foreground
            .get(&sample_size)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sample sizes that have a foreground level, finest first.
    pub fn sample_sizes(&self) -> impl Iterator<Item = SampleSize> + '_ {
        self.foreground.keys().copied()
    }

    /// Total number of foreground tiles across all levels.
    pub fn foreground_tile_count(&self) -> usize {
        self.foreground.values().map(Vec::len).sum()
    }
}

/// Partition the image into a grid of cells for one sample size.
fn tile_level(
    image_size: IntSize,
    min_tile_size: IntSize,
    sample_size: SampleSize,
) -> Vec<BitmapRegionTile> {
    let s = sample_size.get();
    let cell_width = min_tile_size
        .width
        .saturating_mul(s)
        .clamp(1, image_size.width.max(1));
    let cell_height = min_tile_size
        .height
        .saturating_mul(s)
        .clamp(1, image_size.height.max(1));

    // Fractional counts are dropped; the last row/column is stretched instead.
    let columns = (image_size.width / cell_width).max(1);
    let rows = (image_size.height / cell_height).max(1);

    let mut tiles = Vec::with_capacity(columns as usize * rows as usize);
    for row in 0..rows {
        let top = row * cell_height;
        let bottom = if row == rows - 1 {
            image_size.height
        } else {
            top + cell_height
        };

        for column in 0..columns {
            let left = column * cell_width;
            let right = if column == columns - 1 {
                image_size.width
            } else {
                left + cell_width
            };

            tiles.push(BitmapRegionTile::new(
                IntRect::new(left, top, right, bottom),
                sample_size,
            ));
        }
    }
    tiles
}

// =============================================================================
// Tests
// =============================================================================
