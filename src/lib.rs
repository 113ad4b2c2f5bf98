//! # Subsampling Viewer
//!
//! Renders very large images inside a pannable, zoomable viewport without
//! ever decoding the whole image at full resolution.
//!
//! The image is cut into a multi-resolution grid of tiles. For the current
//! zoom level only the tiles that intersect the viewport are decoded, at the
//! coarsest resolution that still looks sharp. A single low-resolution base
//! tile covering the whole image is drawn underneath while they load.
//!
//! ## Features
//!
//! - **Sample-size selection**: power-of-two downsampling chosen from the zoom level
//! - **Tile grid**: one base tile plus a foreground grid per sample size
//! - **Asynchronous cache**: throttled, latest-wins decode dispatch with cancellation
//! - **Render lists**: ordered, draw-ready tiles with progressive fallback
//!
//! ## Architecture
//!
//! - [`geometry`] - sizes, rectangles, offsets and scale factors
//! - [`tile`] - sample sizes, grid generation, tile cache and composition
//! - [`decoder`] - region decoder traits, reference `image` decoder, error reporting
//! - [`state`] - observable view state for the UI
//! - [`pipeline`] - the per-image driver tying everything together
//! - [`config`] - pipeline configuration and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subsampling_viewer::{
//!     ContentTransformation, ImageDecoderFactory, ImageSource, IntSize, LoggingErrorReporter,
//!     PipelineConfig, SubSamplingImage,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let image = SubSamplingImage::spawn(
//!         ImageSource::file("scan.jpg"),
//!         Arc::new(ImageDecoderFactory),
//!         Arc::new(LoggingErrorReporter),
//!         PipelineConfig::default(),
//!     );
//!     image.set_canvas_size(IntSize::new(1080, 1920));
//!     image.set_transformation(ContentTransformation::IDENTITY);
//!
//!     let snapshot = image
//!         .state()
//!         .wait_until(|snapshot| snapshot.is_image_loaded())
//!         .await;
//!     println!("{} tiles to draw", snapshot.tiles.len());
//! }
//! ```

pub mod config;
pub mod decoder;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod state;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, GridConfig, PipelineConfig, RenderConfig};
pub use decoder::{
    Bitmap, ErrorReporter, ImageDecoderFactory, ImageFileDecoder, ImageSource,
    LoggingErrorReporter, NoOpErrorReporter, PixelFormat, RegionDecoder, RegionDecoderFactory,
};
pub use error::DecodeError;
pub use geometry::{IntRect, IntSize, Offset, Rect, ScaleFactor};
pub use pipeline::SubSamplingImage;
pub use state::{ViewSnapshot, ViewState};
pub use tile::{
    BitmapRegionTile, CanvasRegionTile, ContentTransformation, LoadedBitmaps, RenderList,
    RenderListComposer, SampleSize, TileCache, TileGrid, TileLoadState,
};
