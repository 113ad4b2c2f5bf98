//! Render-list composition.
//!
//! Turns the current viewport transformation, the static [`TileGrid`] and the
//! cache's loaded bitmaps into the ordered list of tiles the UI should draw,
//! plus the working set the cache should keep.

use std::sync::Arc;

use serde::Serialize;

use crate::decoder::Bitmap;
use crate::geometry::{IntSize, Offset, Rect, ScaleFactor};

use super::cache::{LoadedBitmaps, TileCache};
use super::grid::{BitmapRegionTile, TileGrid};
use super::sample_size::SampleSize;

// =============================================================================
// Inputs and Outputs
// =============================================================================

/// Maps unscaled image coordinates to screen coordinates: scale, then offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ContentTransformation {
    pub scale: ScaleFactor,
    pub offset: Offset,
}

impl ContentTransformation {
    pub const IDENTITY: ContentTransformation = ContentTransformation {
        scale: ScaleFactor::IDENTITY,
        offset: Offset::ZERO,
    };

    pub fn new(scale: ScaleFactor, offset: Offset) -> Self {
        Self { scale, offset }
    }
}

/// A tile positioned on the canvas, ready to draw.
#[derive(Debug, Clone, Serialize)]
pub struct CanvasRegionTile {
    /// Where the tile lands on screen
    pub bounds: Rect,

    /// Which region/sample size the bitmap is for
    pub bitmap_region: BitmapRegionTile,

    /// Decoded pixels, `None` until the cache has them
    #[serde(rename = "loaded", serialize_with = "serialize_is_some")]
    pub bitmap: Option<Arc<Bitmap>>,

    /// Whether this is the low-resolution whole-image fallback
    pub is_base_tile: bool,
}

impl CanvasRegionTile {
    pub fn has_bitmap(&self) -> bool {
        self.bitmap.is_some()
    }
}

/// Bitmaps compare by identity so that a recomposition with the same cache
/// snapshot yields an equal list.
impl PartialEq for CanvasRegionTile {
    fn eq(&self, other: &Self) -> bool {
        let same_bitmap = match (&self.bitmap, &other.bitmap) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_bitmap
            && self.bounds == other.bounds
            && self.bitmap_region == other.bitmap_region
            && self.is_base_tile == other.is_base_tile
    }
}

fn serialize_is_some<S: serde::Serializer>(
    bitmap: &Option<Arc<Bitmap>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_bool(bitmap.is_some())
}

/// Result of one composition pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderList {
    /// Draw order: base tile first (when drawn), then foreground tiles
    pub tiles: Vec<CanvasRegionTile>,

    /// Tiles the cache must keep: the base tile plus every visible foreground tile
    pub wanted: Vec<BitmapRegionTile>,
}

// =============================================================================
// Composer
// =============================================================================

/// Composes render lists for one tile grid and canvas size.
pub struct RenderListComposer {
    grid: Arc<TileGrid>,
    canvas_size: IntSize,
}

impl RenderListComposer {
    pub fn new(grid: Arc<TileGrid>, canvas_size: IntSize) -> Self {
        Self { grid, canvas_size }
    }

    pub fn grid(&self) -> &Arc<TileGrid> {
        &self.grid
    }

    pub fn canvas_size(&self) -> IntSize {
        self.canvas_size
    }

    /// Build the render list for `transformation` from the bitmaps decoded so far.
    ///
    /// Never waits for a decode: missing bitmaps are left as `None` and the
    /// base tile is drawn underneath to fill the gaps.
    pub fn compose(
        &self,
        transformation: &ContentTransformation,
        bitmaps: &LoadedBitmaps,
    ) -> RenderList {
        let sample_size =
            SampleSize::for_scale(transformation.scale.max_scale(), self.grid.image_size());

        let foreground: Vec<CanvasRegionTile> = self
            .grid
            .foreground(sample_size)
            .iter()
            .filter_map(|tile| {
                let bounds = tile
                    .region
                    .scaled_and_offset_by(transformation.scale, transformation.offset);
                bounds
                    .overlaps_canvas(self.canvas_size)
                    .then(|| CanvasRegionTile {
                        bounds,
                        bitmap_region: *tile,
                        bitmap: bitmaps.get(tile).cloned(),
                        is_base_tile: false,
                    })
            })
            .collect();

        let base = self.grid.base();
        let mut wanted = Vec::with_capacity(foreground.len() + 1);
        wanted.push(*base);
        wanted.extend(foreground.iter().map(|tile| tile.bitmap_region));

        // The base tile fills gaps under foreground tiles that are still loading.
        let draw_base = foreground.is_empty() || foreground.iter().any(|tile| !tile.has_bitmap());

        let mut tiles = Vec::with_capacity(foreground.len() + 1);
        if draw_base {
            tiles.push(CanvasRegionTile {
                bounds: base
                    .region
                    .scaled_and_offset_by(transformation.scale, transformation.offset),
                bitmap_region: *base,
                bitmap: bitmaps.get(base).cloned(),
                is_base_tile: true,
            });
        }
        tiles.extend(foreground);

        RenderList { tiles, wanted }
    }

    /// [`compose`](Self::compose), then make the result's working set the
    /// cache's working set.
    pub fn compose_and_request(
        &self,
        transformation: &ContentTransformation,
        bitmaps: &LoadedBitmaps,
        cache: &TileCache,
    ) -> Vec<CanvasRegionTile> {
        let RenderList { tiles, wanted } = self.compose(transformation, bitmaps);
        cache.request_tiles(&wanted);
        tiles
    }
}

// =============================================================================
// Tests
// =============================================================================
