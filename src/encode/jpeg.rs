//! JPEG encoder
//!
//! JPEG has no alpha channel. Pixels are composited over black before
//! encoding, so a transparent background comes out black, the same result a
//! browser canvas produces when exporting to JPEG.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::ExtendedColorType;

use super::{EncodeError, FrameEncoder};
use crate::frame::Frame;

/// Default encode quality in the 0.0–1.0 range
pub const DEFAULT_QUALITY: f32 = 0.8;

/// JPEG encoder with a fixed quality
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    /// Create an encoder from a 0.0–1.0 quality factor
    ///
    /// Out-of-range values are clamped; the codec quality is at least 1.
    pub fn new(quality: f32) -> Self {
        let quality = if quality.is_finite() {
            quality.clamp(0.0, 1.0)
        } else {
            DEFAULT_QUALITY
        };
        Self {
            quality: ((quality * 100.0).round() as u8).max(1),
        }
    }

    /// Codec quality in the 1–100 range
    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl FrameEncoder for JpegEncoder {
    fn encode(&self, frame: &Frame) -> Result<Bytes, EncodeError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(EncodeError::EmptyFrame { width, height });
        }

        let rgb = flatten_over_black(frame);
        let mut out = Vec::with_capacity(rgb.len() / 8);
        ImageJpegEncoder::new_with_quality(&mut out, self.quality).encode(
            &rgb,
            width,
            height,
            ExtendedColorType::Rgb8,
        )?;

        Ok(Bytes::from(out))
    }
}

fn flatten_over_black(frame: &Frame) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(frame.len() * 3);
    for px in frame.pixels() {
        let a = px.a as u16;
        rgb.push(((px.r as u16 * a + 127) / 255) as u8);
        rgb.push(((px.g as u16 * a + 127) / 255) as u8);
        rgb.push(((px.b as u16 * a + 127) / 255) as u8);
    }
    rgb
}
