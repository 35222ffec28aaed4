//! Segmentation mask
//!
//! A mask is produced asynchronously by the segmentation worker and may lag
//! the frame it ends up composited with. Consumers must check
//! [`SegmentationMask::matches`] before using it against a frame.

use super::buffer::{pixel_count, Frame, FrameError};

/// Label value for a foreground (person) cell
pub const FOREGROUND: u8 = 1;

/// Label value for a background cell
pub const BACKGROUND: u8 = 0;

/// Per-pixel binary classification of a frame
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    labels: Vec<u8>,
    scores: Option<Vec<f32>>,
}

impl SegmentationMask {
    /// Create a mask from row-major labels
    pub fn new(width: u32, height: u32, labels: Vec<u8>) -> Result<Self, FrameError> {
        check_len(width, height, labels.len())?;
        Ok(Self {
            width,
            height,
            labels,
            scores: None,
        })
    }

    /// Create a mask where every cell has the same label
    pub fn uniform(width: u32, height: u32, label: u8) -> Self {
        Self {
            width,
            height,
            labels: vec![label; pixel_count(width, height)],
            scores: None,
        }
    }

    /// Attach per-cell confidence scores
    pub fn with_scores(mut self, scores: Vec<f32>) -> Result<Self, FrameError> {
        check_len(self.width, self.height, scores.len())?;
        self.scores = Some(scores);
        Ok(self)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Row-major labels
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Row-major confidence scores, if the segmenter produced them
    pub fn scores(&self) -> Option<&[f32]> {
        self.scores.as_deref()
    }

    /// Whether the cell at row-major index `index` is foreground
    pub fn is_foreground(&self, index: usize) -> bool {
        self.labels.get(index).copied() == Some(FOREGROUND)
    }

    /// Label at `(x, y)`
    pub fn label(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.labels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Number of foreground cells
    pub fn foreground_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == FOREGROUND).count()
    }

    /// Whether this mask can be applied to `frame`
    pub fn matches(&self, frame: &Frame) -> bool {
        self.dimensions() == frame.dimensions()
    }
}

fn check_len(width: u32, height: u32, actual: usize) -> Result<(), FrameError> {
    let expected = pixel_count(width, height);
    if actual != expected {
        return Err(FrameError::SizeMismatch {
            width,
            height,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rgba;

    #[test]
    fn test_mask_length_checked() {
        assert!(SegmentationMask::new(2, 2, vec![0; 4]).is_ok());
        assert!(SegmentationMask::new(2, 2, vec![0; 3]).is_err());

        let mask = SegmentationMask::uniform(2, 1, FOREGROUND);
        assert!(mask.clone().with_scores(vec![0.9, 0.8]).is_ok());
        assert!(mask.with_scores(vec![0.9]).is_err());
    }

    #[test]
    fn test_label_lookup() {
        let mask = SegmentationMask::new(2, 1, vec![BACKGROUND, FOREGROUND]).unwrap();

        assert!(!mask.is_foreground(0));
        assert!(mask.is_foreground(1));
        assert!(!mask.is_foreground(2));
        assert_eq!(mask.label(1, 0), Some(FOREGROUND));
        assert_eq!(mask.label(0, 1), None);
        assert_eq!(mask.foreground_count(), 1);
    }

    #[test]
    fn test_only_exact_label_is_foreground() {
        let mask = SegmentationMask::new(3, 1, vec![1, 2, 255]).unwrap();

        assert!(mask.is_foreground(0));
        assert!(!mask.is_foreground(1));
        assert!(!mask.is_foreground(2));
    }

    #[test]
    fn test_matches_frame_dimensions() {
        let mask = SegmentationMask::uniform(4, 3, BACKGROUND);

        assert!(mask.matches(&Frame::filled(4, 3, Rgba::TRANSPARENT)));
        assert!(!mask.matches(&Frame::filled(3, 4, Rgba::TRANSPARENT)));
    }
}
