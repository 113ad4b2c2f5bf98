//! Decoder layer.
//!
//! Everything the tile pipeline needs from the outside world to turn image
//! regions into pixels:
//!
//! - [`RegionDecoder`] / [`RegionDecoderFactory`]: the decoding capability
//! - [`ImageDecoderFactory`]: reference implementation on top of the `image` crate
//! - [`ErrorReporter`]: where open and decode failures are sent

mod image_file;
mod region;
mod reporter;

pub use image_file::{ImageDecoderFactory, ImageFileDecoder};
pub use region::{Bitmap, ImageSource, PixelFormat, RegionDecoder, RegionDecoderFactory};
pub use reporter::{ErrorReporter, LoggingErrorReporter, NoOpErrorReporter};
