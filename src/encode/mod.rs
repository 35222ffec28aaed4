//! Frame encoding
//!
//! The hub treats encoding as an opaque `encode(pixels) -> bytes` step.
//! `FrameEncoder` is that seam; `JpegEncoder` is the production encoder.

pub mod jpeg;

use bytes::Bytes;
use thiserror::Error;

use crate::frame::Frame;

pub use jpeg::JpegEncoder;

/// Errors from a single encode attempt
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Frame has zero width or height
    #[error("cannot encode an empty {width}x{height} frame")]
    EmptyFrame { width: u32, height: u32 },

    /// The image codec rejected the frame
    #[error("jpeg encode failed: {0}")]
    Jpeg(#[from] image::ImageError),

    /// The blocking encode task panicked or was cancelled
    #[error("encode task failed: {0}")]
    Task(String),

    /// Encoder-specific failure
    #[error("encode failed: {0}")]
    Other(String),
}

/// Turns a composited frame into transferable bytes
pub trait FrameEncoder: Send + Sync + 'static {
    /// Encode one frame
    fn encode(&self, frame: &Frame) -> Result<Bytes, EncodeError>;

    /// MIME type of the encoded bytes
    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }
}
