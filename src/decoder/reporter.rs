//! Error reporting hook.
//!
//! Decode failures never cross the pipeline's task boundary as errors. They
//! are handed to an [`ErrorReporter`] instead, and the pipeline carries on
//! with whatever it has.

use tracing::{error, warn};

use crate::error::DecodeError;
use crate::tile::BitmapRegionTile;

use super::region::ImageSource;

/// Receives failures from the decoding pipeline.
pub trait ErrorReporter: Send + Sync {
    /// The source could not be opened. Called at most once per source.
    fn on_image_loading_failed(&self, error: &DecodeError, source: &ImageSource);

    /// A single tile failed to decode. The tile stays absent and will be
    /// requested again on a later viewport change.
    fn on_region_decoding_failed(
        &self,
        error: &DecodeError,
        source: &ImageSource,
        tile: &BitmapRegionTile,
    ) {
        warn!(
            source = %source,
            region = %tile.region,
            sample_size = %tile.sample_size,
            "Failed to decode region: {}",
            error
        );
    }
}

/// Ignores every failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpErrorReporter;

impl ErrorReporter for NoOpErrorReporter {
    fn on_image_loading_failed(&self, _error: &DecodeError, _source: &ImageSource) {}

    fn on_region_decoding_failed(
        &self,
        _error: &DecodeError,
        _source: &ImageSource,
        _tile: &BitmapRegionTile,
    ) {
    }
}

/// Logs every failure through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorReporter;

impl ErrorReporter for LoggingErrorReporter {
    fn on_image_loading_failed(&self, error: &DecodeError, source: &ImageSource) {
        error!(source = %source, "Failed to open image: {}", error);
    }
}
