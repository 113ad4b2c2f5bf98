//! Region decoder backed by the `image` crate.
//!
//! Opening a source only reads the image header, so the size is known without
//! touching pixel data. The first region request decodes the full image once
//! on a blocking thread and keeps it; every region is then cropped out of that
//! buffer and resampled to `region / sample_size`.
//!
//! Codecs in the `image` crate cannot decode a sub-rectangle directly. Sources
//! that are truly too large for memory need a format-specific
//! [`RegionDecoder`] plugged in through [`RegionDecoderFactory`].

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::DecodeError;
use crate::geometry::IntSize;
use crate::tile::BitmapRegionTile;

use super::region::{Bitmap, ImageSource, PixelFormat, RegionDecoder, RegionDecoderFactory};

// =============================================================================
// Factory
// =============================================================================

/// Creates [`ImageFileDecoder`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoderFactory;

#[async_trait]
impl RegionDecoderFactory for ImageDecoderFactory {
    async fn create(
        &self,
        source: &ImageSource,
        pixel_format: PixelFormat,
    ) -> Result<Arc<dyn RegionDecoder>, DecodeError> {
        let decoder = ImageFileDecoder::open(source.clone(), pixel_format).await?;
        Ok(Arc::new(decoder))
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Region decoder for any format the `image` crate was built with.
pub struct ImageFileDecoder {
    source: ImageSource,
    image_size: IntSize,
    pixel_format: PixelFormat,

    /// Full-resolution pixels, decoded on first use
    decoded: OnceCell<Arc<DynamicImage>>,
}

impl ImageFileDecoder {
    /// Open `source` and read its dimensions.
    pub async fn open(source: ImageSource, pixel_format: PixelFormat) -> Result<Self, DecodeError> {
        let probe = source.clone();
        let image_size = tokio::task::spawn_blocking(move || read_dimensions(&probe)).await??;

        if image_size.is_empty() {
            return Err(DecodeError::UnsupportedFormat {
                reason: format!("image has no pixels ({})", image_size),
            });
        }

        debug!(source = %source, size = %image_size, "Opened image source");

        Ok(Self {
            source,
            image_size,
            pixel_format,
            decoded: OnceCell::new(),
        })
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    async fn full_image(&self) -> Result<Arc<DynamicImage>, DecodeError> {
        let image = self
            .decoded
            .get_or_try_init(|| async {
                let source = self.source.clone();
                let image = tokio::task::spawn_blocking(move || decode_full(&source)).await??;
                Ok::<_, DecodeError>(Arc::new(image))
            })
            .await?;
        Ok(Arc::clone(image))
    }
}

#[async_trait]
impl RegionDecoder for ImageFileDecoder {
    fn image_size(&self) -> IntSize {
        self.image_size
    }

    async fn decode_region(&self, tile: &BitmapRegionTile) -> Result<Bitmap, DecodeError> {
        if !tile.region.fits_within(self.image_size) || tile.region.area() == 0 {
            return Err(DecodeError::RegionOutOfBounds {
                region: tile.region,
                image_size: self.image_size,
            });
        }

        let image = self.full_image().await?;
        let tile = *tile;
        let format = self.pixel_format;
        let bitmap = tokio::task::spawn_blocking(move || render_region(&image, &tile, format)).await?;
        Ok(bitmap)
    }
}

// =============================================================================
// Blocking helpers
// =============================================================================

fn read_dimensions(source: &ImageSource) -> Result<IntSize, DecodeError> {
    let (width, height) = match source {
        ImageSource::File(path) => ImageReader::open(path)?
            .with_guessed_format()?
            .into_dimensions()?,
        ImageSource::Bytes { data, .. } => ImageReader::new(Cursor::new(data.clone()))
            .with_guessed_format()?
            .into_dimensions()?,
    };
    Ok(IntSize::new(width, height))
}

fn decode_full(source: &ImageSource) -> Result<DynamicImage, DecodeError> {
    let image = match source {
        ImageSource::File(path) => ImageReader::open(path)?.with_guessed_format()?.decode()?,
        ImageSource::Bytes { data, .. } => ImageReader::new(Cursor::new(data.clone()))
            .with_guessed_format()?
            .decode()?,
    };
    Ok(image)
}

fn render_region(image: &DynamicImage, tile: &BitmapRegionTile, format: PixelFormat) -> Bitmap {
    let region = tile.region;
    let cropped = image.crop_imm(region.left, region.top, region.width(), region.height());

    let scaled = if tile.sample_size.get() == 1 {
        cropped
    } else {
        let target = tile.decoded_size();
        cropped.resize_exact(target.width, target.height, FilterType::Triangle)
    };

    let (width, height) = (scaled.width(), scaled.height());
    let pixels = match format {
        PixelFormat::Rgba8 => scaled.to_rgba8().into_raw(),
        PixelFormat::Rgb8 => scaled.to_rgb8().into_raw(),
    };

    Bitmap::new(width, height, format, Bytes::from(pixels))
}

// =============================================================================
// Tests
// =============================================================================
