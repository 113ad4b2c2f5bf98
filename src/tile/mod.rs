//! Tile layer.
//!
//! Decides which regions of the image to decode, at what resolution, and
//! keeps the decoded bitmaps for the current viewport.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   viewport transformation + canvas      │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          RenderListComposer             │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  SampleSize  │  │    TileGrid     │  │
//! │  │  (scale →    │  │  (base tile +   │  │
//! │  │   level)     │  │   foreground)   │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └──────────┬─────────────────────▲────────┘
//!   request_tiles                  │ loaded bitmaps
//!            ▼                     │
//! ┌─────────────────────────────────────────┐
//! │               TileCache                 │
//! │   (throttled decode, working-set        │
//! │    eviction, cancellation)              │
//! └────────────────────┬────────────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             RegionDecoder               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`SampleSize`]: power-of-two downsample factor and its selection rules
//! - [`TileGrid`] / [`BitmapRegionTile`]: static multi-resolution tile layout
//! - [`TileCache`]: asynchronous decode scheduling and bitmap store
//! - [`RenderListComposer`]: viewport → ordered list of [`CanvasRegionTile`]s

mod cache;
mod compose;
mod grid;
mod sample_size;

pub use cache::{LoadedBitmaps, TileCache, TileLoadState};
pub use compose::{CanvasRegionTile, ContentTransformation, RenderList, RenderListComposer};
pub use grid::{BitmapRegionTile, TileGrid};
pub use sample_size::SampleSize;
