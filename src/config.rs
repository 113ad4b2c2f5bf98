//! Configuration for the tile pipeline and the `subsampling-viewer` binary.
//!
//! [`PipelineConfig`] holds the knobs of the library itself. The CLI types
//! ([`Cli`], [`Command`], ...) are parsed with clap and support environment
//! variables with the `SUBSAMPLE_` prefix:
//!
//! - `SUBSAMPLE_CANVAS_WIDTH` - Viewport width in pixels (default: 1080)
//! - `SUBSAMPLE_CANVAS_HEIGHT` - Viewport height in pixels (default: 1920)
//! - `SUBSAMPLE_THROTTLE_MS` - Decode dispatch throttle window (default: 100)
//! - `SUBSAMPLE_TIMEOUT_MS` - How long `render` waits for full quality (default: 10000)
//! - `SUBSAMPLE_PIXEL_FORMAT` - `rgba8` or `rgb8` (default: rgba8)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::decoder::PixelFormat;
use crate::geometry::{IntSize, Offset, ScaleFactor};
use crate::tile::ContentTransformation;

// =============================================================================
// Default Values
// =============================================================================

/// Default quiescence window between two decode dispatches.
pub const DEFAULT_THROTTLE_WINDOW_MS: u64 = 100;

/// Default viewport width.
pub const DEFAULT_CANVAS_WIDTH: u32 = 1080;

/// Default viewport height.
pub const DEFAULT_CANVAS_HEIGHT: u32 = 1920;

/// Default time the `render` command waits for every visible tile.
pub const DEFAULT_RENDER_TIMEOUT_MS: u64 = 10_000;

/// Longest accepted throttle window.
const MAX_THROTTLE_WINDOW_MS: u64 = 10_000;

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Settings shared by the tile cache and the pipeline driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bursts of load requests inside this window collapse into one dispatch
    pub throttle_window: Duration,

    /// Pixel layout requested from the decoder
    pub pixel_format: PixelFormat,
}

impl PipelineConfig {
    pub fn with_throttle_window(mut self, window: Duration) -> Self {
        self.throttle_window = window;
        self
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.throttle_window > Duration::from_millis(MAX_THROTTLE_WINDOW_MS) {
            return Err(format!(
                "throttle window must be at most {}ms",
                MAX_THROTTLE_WINDOW_MS
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            throttle_window: Duration::from_millis(DEFAULT_THROTTLE_WINDOW_MS),
            pixel_format: PixelFormat::default(),
        }
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Subsampling Viewer - inspect how a large image is tiled and decoded.
#[derive(Parser, Debug, Clone)]
#[command(name = "subsampling-viewer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the tile grid generated for an image and a canvas size.
    Grid(GridConfig),

    /// Run the decode pipeline for one viewport and print the render list.
    Render(RenderConfig),
}

/// Canvas size arguments shared by both commands.
#[derive(Args, Debug, Clone)]
pub struct CanvasArgs {
    /// Viewport width in pixels.
    #[arg(long, default_value_t = DEFAULT_CANVAS_WIDTH, env = "SUBSAMPLE_CANVAS_WIDTH")]
    pub canvas_width: u32,

    /// Viewport height in pixels.
    #[arg(long, default_value_t = DEFAULT_CANVAS_HEIGHT, env = "SUBSAMPLE_CANVAS_HEIGHT")]
    pub canvas_height: u32,
}

impl CanvasArgs {
    pub fn canvas_size(&self) -> IntSize {
        IntSize::new(self.canvas_width, self.canvas_height)
    }

    fn validate(&self) -> Result<(), String> {
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err("canvas width and height must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct GridConfig {
    /// Path to the image file.
    pub image: PathBuf,

    #[command(flatten)]
    pub canvas: CanvasArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.canvas.validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    /// Path to the image file.
    pub image: PathBuf,

    #[command(flatten)]
    pub canvas: CanvasArgs,

    /// Zoom factor applied to the unscaled image.
    #[arg(long, default_value_t = 1.0)]
    pub scale: f32,

    /// Horizontal pan in screen pixels.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub offset_x: f32,

    /// Vertical pan in screen pixels.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub offset_y: f32,

    /// Throttle window for decode dispatch, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_THROTTLE_WINDOW_MS, env = "SUBSAMPLE_THROTTLE_MS")]
    pub throttle_ms: u64,

    /// Give up waiting for full quality after this many milliseconds.
    #[arg(long, default_value_t = DEFAULT_RENDER_TIMEOUT_MS, env = "SUBSAMPLE_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Pixel layout of decoded tiles.
    #[arg(long, value_enum, default_value_t = PixelFormat::Rgba8, env = "SUBSAMPLE_PIXEL_FORMAT")]
    pub pixel_format: PixelFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.canvas.validate()?;

        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err("scale must be a positive number".to_string());
        }
        if !self.offset_x.is_finite() || !self.offset_y.is_finite() {
            return Err("offsets must be finite numbers".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }

        self.pipeline_config().validate()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_throttle_window(Duration::from_millis(self.throttle_ms))
            .with_pixel_format(self.pixel_format)
    }

    pub fn transformation(&self) -> ContentTransformation {
        ContentTransformation::new(
            ScaleFactor::uniform(self.scale),
            Offset::new(self.offset_x, self.offset_y),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// =============================================================================
// Tests
// =============================================================================
