//! Region decoder capability.
//!
//! The tile pipeline never decodes image formats itself. It asks a
//! [`RegionDecoder`] for one region of the source image at one sample size and
//! gets a [`Bitmap`] back. Decoders are created per image source by a
//! [`RegionDecoderFactory`], which is also where unreadable or unsupported
//! sources are rejected.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::DecodeError;
use crate::geometry::IntSize;
use crate::tile::BitmapRegionTile;

// =============================================================================
// Image Source
// =============================================================================

/// Where the pixels of an image come from.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Image file on the local file system
    File(PathBuf),

    /// Encoded image already held in memory
    Bytes {
        /// Identifier used in logs and error reports
        id: Arc<str>,
        data: Bytes,
    },
}

impl ImageSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ImageSource::File(path.into())
    }

    pub fn bytes(id: impl Into<Arc<str>>, data: impl Into<Bytes>) -> Self {
        ImageSource::Bytes {
            id: id.into(),
            data: data.into(),
        }
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ImageSource::Bytes { id, data } => f
                .debug_struct("Bytes")
                .field("id", id)
                .field("len", &data.len())
                .finish(),
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::File(path) => write!(f, "{}", path.display()),
            ImageSource::Bytes { id, .. } => write!(f, "bytes:{}", id),
        }
    }
}

// =============================================================================
// Bitmap
// =============================================================================

/// Pixel layout of decoded bitmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 4 bytes per pixel, straight alpha
    #[default]
    Rgba8,

    /// 3 bytes per pixel, no alpha; halves memory for opaque images
    Rgb8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// A decoded region, ready to be drawn.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Bytes,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Bytes) -> Self {
        Self {
            width,
            height,
            format,
            pixels,
        }
    }

    pub fn size(&self) -> IntSize {
        IntSize::new(self.width, self.height)
    }

    /// Memory held by the pixel buffer.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

// =============================================================================
// Decoder Traits
// =============================================================================

/// Decodes regions of one opened image source.
///
/// Implementations must be thread-safe: the tile cache calls
/// `decode_region` concurrently from many tasks. CPU-heavy work belongs on a
/// blocking thread (`tokio::task::spawn_blocking`).
#[async_trait]
pub trait RegionDecoder: Send + Sync {
    /// Unscaled size of the source image.
    fn image_size(&self) -> IntSize;

    /// Decode `tile.region` at `tile.sample_size`.
    ///
    /// The returned bitmap is roughly `region / sample_size` pixels.
    async fn decode_region(&self, tile: &BitmapRegionTile) -> Result<Bitmap, DecodeError>;
}

/// Opens image sources into region decoders.
#[async_trait]
pub trait RegionDecoderFactory: Send + Sync {
    /// Open `source`, reading enough of it to know the image size.
    ///
    /// Fails if the source is unreadable or not a supported format.
    async fn create(
        &self,
        source: &ImageSource,
        pixel_format: PixelFormat,
    ) -> Result<Arc<dyn RegionDecoder>, DecodeError>;
}
