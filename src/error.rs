use thiserror::Error;

use crate::geometry::{IntRect, IntSize};

/// Errors raised while opening an image source or decoding one of its regions.
///
/// Payloads are strings so the error stays `Clone` and can be handed to an
/// error reporter and a log line without ownership juggling.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The source could not be read (missing file, permission, truncated data)
    #[error("I/O error: {0}")]
    Io(String),

    /// The source is readable but not an image format the decoder understands
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// Requested region does not fit inside the image
    #[error("Region {region} is outside image bounds {image_size}")]
    RegionOutOfBounds { region: IntRect, image_size: IntSize },

    /// The codec failed while decoding pixel data
    #[error("Image decoding failed: {0}")]
    Image(String),

    /// The decode was abandoned before it finished
    #[error("Decoding was cancelled")]
    Cancelled,
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        DecodeError::Io(err.to_string())
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => DecodeError::Io(e.to_string()),
            image::ImageError::Unsupported(e) => DecodeError::UnsupportedFormat {
                reason: e.to_string(),
            },
            other => DecodeError::Image(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for DecodeError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            DecodeError::Cancelled
        } else {
            DecodeError::Image(format!("decoder task panicked: {}", err))
        }
    }
}
