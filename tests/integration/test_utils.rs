//! Test utilities for integration tests.
//!
//! This module provides mock decoders with call tracking, a recording error
//! reporter and helpers for building small in-memory images.

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use subsampling_viewer::decoder::{
    Bitmap, ErrorReporter, ImageSource, PixelFormat, RegionDecoder, RegionDecoderFactory,
};
use subsampling_viewer::error::DecodeError;
use subsampling_viewer::geometry::IntSize;
use subsampling_viewer::tile::{BitmapRegionTile, SampleSize};

// =============================================================================
// Gate
// =============================================================================

/// Holds decodes until opened. Stays open once opened.
#[derive(Clone)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn closed() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            open: Arc::new(open),
        }
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    async fn pass(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

// =============================================================================
// Tracking Mock Decoder
// =============================================================================

/// A mock region decoder that records every decode request.
///
/// Decoded bitmaps are blank, sized `region / sample_size`.
pub struct TrackingMockDecoder {
    image_size: IntSize,
    calls: Mutex<Vec<BitmapRegionTile>>,
    completed: AtomicUsize,
    failing: HashSet<BitmapRegionTile>,
    gated: Option<(SampleSize, Gate)>,
    delay: Option<Duration>,
}

impl TrackingMockDecoder {
    pub fn new(image_size: IntSize) -> Self {
        Self {
            image_size,
            calls: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
            failing: HashSet::new(),
            gated: None,
            delay: None,
        }
    }

    pub fn calls(&self) -> Vec<BitmapRegionTile> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegionDecoder for TrackingMockDecoder {
    fn image_size(&self) -> IntSize {
        self.image_size
    }

    async fn decode_region(&self, tile: &BitmapRegionTile) -> Result<Bitmap, DecodeError> {
        self.calls.lock().unwrap().push(*tile);

        if let Some((sample_size, gate)) = &self.gated {
            if tile.sample_size == *sample_size {
                gate.pass().await;
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(tile) {
            return Err(DecodeError::Image(format!("corrupt region {}", tile.region)));
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        let size = tile.decoded_size();
        let pixels = vec![0u8; size.area() as usize * PixelFormat::Rgba8.bytes_per_pixel()];
        Ok(Bitmap::new(
            size.width,
            size.height,
            PixelFormat::Rgba8,
            Bytes::from(pixels),
        ))
    }
}

// =============================================================================
// Mock Decoder Factory
// =============================================================================

/// Settings applied to every decoder a [`MockDecoderFactory`] creates.
#[derive(Clone, Default)]
struct DecoderSettings {
    failing: HashSet<BitmapRegionTile>,
    gated: Option<(SampleSize, Gate)>,
    delay: Option<Duration>,
}

/// Factory serving in-memory images by source id.
///
/// Unknown sources fail to open with an I/O error.
#[derive(Default)]
pub struct MockDecoderFactory {
    images: HashMap<String, IntSize>,
    settings: DecoderSettings,
    opens: AtomicUsize,
    decoders: Mutex<Vec<Arc<TrackingMockDecoder>>>,
}

impl MockDecoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, id: &str, image_size: IntSize) -> Self {
        self.images.insert(id.to_string(), image_size);
        self
    }

    pub fn with_failing_tile(mut self, tile: BitmapRegionTile) -> Self {
        self.settings.failing.insert(tile);
        self
    }

    /// Hold decodes of `sample_size` tiles until `gate` opens.
    pub fn with_gate(mut self, sample_size: SampleSize, gate: Gate) -> Self {
        self.settings.gated = Some((sample_size, gate));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.settings.delay = Some(delay);
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Most recently created decoder.
    pub fn last_decoder(&self) -> Option<Arc<TrackingMockDecoder>> {
        self.decoders.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl RegionDecoderFactory for MockDecoderFactory {
    async fn create(
        &self,
        source: &ImageSource,
        _pixel_format: PixelFormat,
    ) -> Result<Arc<dyn RegionDecoder>, DecodeError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let key = match source {
            ImageSource::Bytes { id, .. } => id.to_string(),
            ImageSource::File(path) => path.display().to_string(),
        };
        let image_size = self
            .images
            .get(&key)
            .copied()
            .ok_or_else(|| DecodeError::Io(format!("no such image: {}", key)))?;

        let decoder = Arc::new(TrackingMockDecoder {
            failing: self.settings.failing.clone(),
            gated: self.settings.gated.clone(),
            delay: self.settings.delay,
            ..TrackingMockDecoder::new(image_size)
        });
        self.decoders.lock().unwrap().push(Arc::clone(&decoder));
        Ok(decoder)
    }
}

/// Source handled by [`MockDecoderFactory`].
pub fn mock_source(id: &str) -> ImageSource {
    ImageSource::bytes(id, Bytes::new())
}

// =============================================================================
// Recording Reporter
// =============================================================================

/// Error reporter that records every call.
#[derive(Default)]
pub struct RecordingReporter {
    load_failures: Mutex<Vec<String>>,
    region_failures: Mutex<Vec<BitmapRegionTile>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `"<source>: <error>"` per source-open failure.
    pub fn load_failures(&self) -> Vec<String> {
        self.load_failures.lock().unwrap().clone()
    }

    pub fn region_failures(&self) -> Vec<BitmapRegionTile> {
        self.region_failures.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn on_image_loading_failed(&self, error: &DecodeError, source: &ImageSource) {
        self.load_failures
            .lock()
            .unwrap()
            .push(format!("{}: {}", source, error));
    }

    fn on_region_decoding_failed(
        &self,
        _error: &DecodeError,
        _source: &ImageSource,
        tile: &BitmapRegionTile,
    ) {
        self.region_failures.lock().unwrap().push(*tile);
    }
}

// =============================================================================
// Images
// =============================================================================

/// Encode a PNG whose left half is red and right half is blue.
pub fn create_two_tone_png(width: u32, height: u32) -> Bytes {
    let image = RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    });

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("PNG encoding should succeed");
    Bytes::from(buffer.into_inner())
}
