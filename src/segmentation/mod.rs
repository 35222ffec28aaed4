//! Person segmentation
//!
//! This module provides:
//! - `Segmenter`: the inference boundary (`segment(frame, options) -> mask`)
//! - `SegmentationWorker`: the loop keeping the latest mask fresh
//! - `ModelConfig` / `SegmentationOptions`: model and per-call parameters

pub mod config;
pub mod segmenter;
pub mod worker;

pub use config::{Architecture, InternalResolution, ModelConfig, SegmentationOptions};
pub use segmenter::{InferenceError, LuminanceSegmenter, Segmenter};
pub use worker::{MaskReader, SegmentationWorker, StepOutcome};
