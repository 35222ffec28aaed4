//! Segmentation model parameters
//!
//! `ModelConfig` is fixed when the model is loaded; `SegmentationOptions` is
//! passed on every inference call. Both deserialize from the camelCase keys of
//! the `bodyPix` preferences section.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Backbone network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Architecture {
    #[default]
    MobileNetV1,
    ResNet50,
}

/// Resolution the input is resized to before inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InternalResolution {
    Low,
    #[default]
    Medium,
    High,
    Full,
}

impl InternalResolution {
    /// Scale factor applied to the input frame
    pub fn scale_factor(self) -> f32 {
        match self {
            InternalResolution::Low => 0.25,
            InternalResolution::Medium => 0.5,
            InternalResolution::High => 0.75,
            InternalResolution::Full => 1.0,
        }
    }
}

/// Parameters used to load the segmentation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    pub architecture: Architecture,
    /// Output stride (8, 16 or 32)
    pub output_stride: u32,
    /// Depth multiplier (MobileNet only)
    pub multiplier: f32,
    /// Bytes per quantized weight (1, 2 or 4)
    pub quant_bytes: u8,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::MobileNetV1,
            output_stride: 16,
            multiplier: 0.75,
            quant_bytes: 2,
        }
    }
}

impl ModelConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if ![8, 16, 32].contains(&self.output_stride) {
            return Err(ConfigError::Invalid(format!(
                "outputStride must be 8, 16 or 32, got {}",
                self.output_stride
            )));
        }
        if ![1, 2, 4].contains(&self.quant_bytes) {
            return Err(ConfigError::Invalid(format!(
                "quantBytes must be 1, 2 or 4, got {}",
                self.quant_bytes
            )));
        }
        if self.architecture == Architecture::MobileNetV1
            && ![0.5, 0.75, 1.0].contains(&self.multiplier)
        {
            return Err(ConfigError::Invalid(format!(
                "multiplier must be 0.5, 0.75 or 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// Per-call inference options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentationOptions {
    pub internal_resolution: InternalResolution,
    /// Minimum per-pixel probability for a foreground label
    pub segmentation_threshold: f32,
    /// Maximum number of people to detect
    pub max_detections: u32,
    /// Minimum detection score
    pub score_threshold: f32,
    /// Non-maximum suppression radius in pixels
    pub nms_radius: u32,
}

impl Default for SegmentationOptions {
    fn default() -> Self {
        Self {
            internal_resolution: InternalResolution::Medium,
            segmentation_threshold: 0.4,
            max_detections: 1,
            score_threshold: 0.8,
            nms_radius: 10,
        }
    }
}

impl SegmentationOptions {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("segmentationThreshold", self.segmentation_threshold)?;
        check_unit("scoreThreshold", self.score_threshold)?;
        if self.max_detections == 0 {
            return Err(ConfigError::Invalid(
                "maxDetections must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{} must be within 0.0..=1.0, got {}",
            name, value
        )));
    }
    Ok(())
}
