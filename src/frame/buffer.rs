//! RGBA frame buffer

use thiserror::Error;

/// Bytes per RGBA pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Errors raised when building frames or masks from raw buffers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer length does not match the declared dimensions
    #[error("buffer of {actual} bytes does not fit a {width}x{height} grid (expected {expected})")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A single RGBA pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Fully transparent black
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    /// Create a pixel from its channels
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Channels in memory order
    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<[u8; 4]> for Rgba {
    fn from(c: [u8; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

/// An immutable grid of RGBA pixels
///
/// Pixels are stored row-major, tightly packed, 4 bytes each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Create a frame from a packed RGBA buffer
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = pixel_count(width, height) * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a frame where every pixel has the same color
    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let data = color.to_array().repeat(pixel_count(width, height));
        Self {
            width,
            height,
            data,
        }
    }

    /// Create a frame from a row-major pixel list
    pub fn from_pixels(width: u32, height: u32, pixels: &[Rgba]) -> Result<Self, FrameError> {
        let data = pixels.iter().flat_map(|p| p.to_array()).collect();
        Self::new(width, height, data)
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels
    pub fn len(&self) -> usize {
        pixel_count(self.width, self.height)
    }

    /// Whether the frame has no pixels
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw packed RGBA bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at `(x, y)`, or `None` when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = &self.data[offset..offset + BYTES_PER_PIXEL];
        Some(Rgba::new(px[0], px[1], px[2], px[3]))
    }

    /// Iterate pixels in row-major order
    pub fn pixels(&self) -> impl Iterator<Item = Rgba> + '_ {
        self.data
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|px| Rgba::new(px[0], px[1], px[2], px[3]))
    }

    /// Build a frame whose buffer length is already known to be correct
    pub(crate) fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), pixel_count(width, height) * BYTES_PER_PIXEL);
        Self {
            width,
            height,
            data,
        }
    }
}

pub(crate) fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}
