//! Inference boundary
//!
//! The segmentation model is opaque to the pipeline: anything that turns a
//! frame into a congruent mask can be plugged in as a `Segmenter`.

use async_trait::async_trait;
use thiserror::Error;

use super::config::SegmentationOptions;
use crate::frame::{Frame, Rgba, SegmentationMask, BACKGROUND, FOREGROUND};

/// Errors from a single inference call
///
/// All variants are treated as transient by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    /// Out of memory or another exhausted resource
    #[error("inference resources exhausted: {0}")]
    ResourceExhausted(String),

    /// The model returned an error or an unusable result
    #[error("model failure: {0}")]
    Model(String),
}

/// Person segmentation model
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Classify every pixel of `frame` as foreground or background
    async fn segment(
        &self,
        frame: &Frame,
        options: &SegmentationOptions,
    ) -> Result<SegmentationMask, InferenceError>;
}

/// Luminance keyer
///
/// Labels a pixel foreground when its relative luminance (0.0–1.0) is at
/// least the segmentation threshold. The luminance doubles as the score.
/// The frame is sampled on a grid scaled by the internal resolution and the
/// result is stretched back to the frame size.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuminanceSegmenter;

#[async_trait]
impl Segmenter for LuminanceSegmenter {
    async fn segment(
        &self,
        frame: &Frame,
        options: &SegmentationOptions,
    ) -> Result<SegmentationMask, InferenceError> {
        let (width, height) = frame.dimensions();
        if frame.is_empty() {
            return SegmentationMask::new(width, height, Vec::new())
                .map_err(|e| InferenceError::Model(e.to_string()));
        }

        let scale = options.internal_resolution.scale_factor();
        let grid_w = scaled(width, scale);
        let grid_h = scaled(height, scale);

        let mut grid = Vec::with_capacity(grid_w as usize * grid_h as usize);
        for gy in 0..grid_h {
            for gx in 0..grid_w {
                let x = (gx as u64 * width as u64 / grid_w as u64) as u32;
                let y = (gy as u64 * height as u64 / grid_h as u64) as u32;
                let px = frame.pixel(x, y).ok_or_else(|| {
                    InferenceError::Model(format!("sample ({}, {}) out of bounds", x, y))
                })?;
                grid.push(luminance(px));
            }
        }

        let mut labels = Vec::with_capacity(frame.len());
        let mut scores = Vec::with_capacity(frame.len());
        for y in 0..height {
            let gy = (y as u64 * grid_h as u64 / height as u64) as usize;
            for x in 0..width {
                let gx = (x as u64 * grid_w as u64 / width as u64) as usize;
                let luma = grid[gy * grid_w as usize + gx];
                labels.push(if luma >= options.segmentation_threshold {
                    FOREGROUND
                } else {
                    BACKGROUND
                });
                scores.push(luma);
            }
        }

        SegmentationMask::new(width, height, labels)
            .and_then(|mask| mask.with_scores(scores))
            .map_err(|e| InferenceError::Model(e.to_string()))
    }
}

fn scaled(len: u32, scale: f32) -> u32 {
    ((len as f32 * scale).round() as u32).clamp(1, len.max(1))
}

fn luminance(px: Rgba) -> f32 {
    (0.2126 * px.r as f32 + 0.7152 * px.g as f32 + 0.0722 * px.b as f32) / 255.0
}
