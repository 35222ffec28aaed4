//! Preferences store

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ConfigError;
use crate::capture::CaptureConstraints;
use crate::compositor::CompositorConfig;
use crate::frame::Rgba;
use crate::hub::{multipart, HubConfig};
use crate::segmentation::{ModelConfig, SegmentationOptions};
use crate::server::ServerConfig;

/// Preferred capture resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresenterPreferences {
    pub width: u32,
    pub height: u32,
}

impl Default for PresenterPreferences {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Segmentation model and inference parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyPixPreferences {
    #[serde(flatten)]
    pub model: ModelConfig,
    #[serde(flatten)]
    pub options: SegmentationOptions,
}

/// MJPEG stream parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamPreferences {
    pub boundary: String,
    pub max_skipped_frames: u32,
    pub max_frame_rate: Option<u32>,
    /// RGBA written for background pixels
    pub background: [u8; 4],
}

impl Default for StreamPreferences {
    fn default() -> Self {
        Self {
            boundary: crate::hub::config::DEFAULT_BOUNDARY.to_string(),
            max_skipped_frames: crate::hub::config::DEFAULT_MAX_SKIPPED_FRAMES,
            max_frame_rate: None,
            background: [0, 0, 0, 0],
        }
    }
}

/// Application preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub http_listener_port: u16,
    /// JPEG quality in 0.0..=1.0
    pub mjpeg_jpeg_quality: f32,
    pub presenter: PresenterPreferences,
    pub body_pix: BodyPixPreferences,
    pub stream: StreamPreferences,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            http_listener_port: 8081,
            mjpeg_jpeg_quality: crate::encode::jpeg::DEFAULT_QUALITY,
            presenter: PresenterPreferences::default(),
            body_pix: BodyPixPreferences::default(),
            stream: StreamPreferences::default(),
        }
    }
}

impl Preferences {
    /// Load preferences from a JSON file
    ///
    /// A missing file yields the defaults. Keys absent from the file keep
    /// their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let prefs = match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No preferences file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), "Preferences loaded");
        Ok(prefs)
    }

    /// Parse and validate preferences from a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let prefs: Self = serde_json::from_str(json)?;
        prefs.validate()?;
        Ok(prefs)
    }

    /// Look up a value by dotted key, e.g. `bodyPix.nmsRadius`
    pub fn get(&self, key: &str) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        key.split('.')
            .try_fold(&root, |value, part| value.get(part))
            .cloned()
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.mjpeg_jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "mjpegJpegQuality must be within 0.0..=1.0, got {}",
                self.mjpeg_jpeg_quality
            )));
        }
        if self.presenter.width == 0 || self.presenter.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "presenter size must be non-zero, got {}x{}",
                self.presenter.width, self.presenter.height
            )));
        }
        if !multipart::is_valid_boundary(&self.stream.boundary) {
            return Err(ConfigError::Invalid(format!(
                "stream.boundary is not a valid multipart boundary: {:?}",
                self.stream.boundary
            )));
        }
        if self.stream.max_skipped_frames == 0 {
            return Err(ConfigError::Invalid(
                "stream.maxSkippedFrames must be at least 1".into(),
            ));
        }

        self.body_pix.model.validate()?;
        self.body_pix.options.validate()
    }

    /// Server configuration listening on all interfaces
    pub fn server_config(&self) -> ServerConfig {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.http_listener_port));
        ServerConfig::with_addr(addr)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig::default()
            .boundary(self.stream.boundary.clone())
            .max_skipped_frames(self.stream.max_skipped_frames)
    }

    pub fn compositor_config(&self) -> CompositorConfig {
        CompositorConfig::default()
            .background(Rgba::from(self.stream.background))
            .max_frame_rate(self.stream.max_frame_rate)
    }

    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            width: self.presenter.width,
            height: self.presenter.height,
            ..CaptureConstraints::default()
        }
    }

    pub fn segmentation_options(&self) -> &SegmentationOptions {
        &self.body_pix.options
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;
    use crate::segmentation::{Architecture, InternalResolution};

    #[test]
    fn test_defaults() {
        let prefs = Preferences::default();

        assert_eq!(prefs.http_listener_port, 8081);
        assert_eq!(prefs.mjpeg_jpeg_quality, 0.8);
        assert_eq!(prefs.presenter.width, 640);
        assert_eq!(prefs.presenter.height, 480);
        assert_eq!(prefs.body_pix.model.architecture, Architecture::MobileNetV1);
        assert_eq!(prefs.stream.boundary, "myboundary");
        assert_eq!(prefs.stream.max_skipped_frames, 15);
        assert!(prefs.stream.max_frame_rate.is_none());
        assert!(prefs.validate().is_ok());
    }

    #[test]
    fn test_dotted_lookup() {
        let prefs = Preferences::default();

        assert_eq!(prefs.get("httpListenerPort"), Some(json!(8081)));
        assert_eq!(prefs.get("presenter.width"), Some(json!(640)));
        assert_eq!(prefs.get("bodyPix.outputStride"), Some(json!(16)));
        assert_eq!(prefs.get("bodyPix.internalResolution"), Some(json!("medium")));
        assert_eq!(prefs.get("bodyPix.nmsRadius"), Some(json!(10)));
        assert_eq!(prefs.get("stream.boundary"), Some(json!("myboundary")));
        assert_eq!(prefs.get("bodyPix.missing"), None);
    }

    #[test]
    fn test_partial_json() {
        let prefs = Preferences::from_json(
            r#"{
                "httpListenerPort": 9000,
                "bodyPix": { "architecture": "ResNet50", "internalResolution": "full" },
                "stream": { "maxFrameRate": 15, "background": [0, 255, 0, 255] }
            }"#,
        )
        .unwrap();

        assert_eq!(prefs.http_listener_port, 9000);
        assert_eq!(prefs.body_pix.model.architecture, Architecture::ResNet50);
        assert_eq!(prefs.body_pix.model.output_stride, 16);
        assert_eq!(
            prefs.body_pix.options.internal_resolution,
            InternalResolution::Full
        );
        assert_eq!(prefs.presenter, PresenterPreferences::default());

        let compositor = prefs.compositor_config();
        assert_eq!(compositor.background, Rgba::new(0, 255, 0, 255));
        assert_eq!(compositor.max_frame_rate, Some(15));
        assert_eq!(prefs.server_config().bind_addr.port(), 9000);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Preferences::from_json(r#"{"mjpegJpegQuality": 1.5}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Preferences::from_json(r#"{"stream": {"boundary": "bad;boundary"}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Preferences::from_json(r#"{"bodyPix": {"outputStride": 7}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Preferences::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path().join("missing.json")).unwrap();

        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"presenter": {{"width": 1280, "height": 720}}}}"#).unwrap();

        let prefs = Preferences::load(file.path()).unwrap();
        let constraints = prefs.capture_constraints();

        assert_eq!(constraints.width, 1280);
        assert_eq!(constraints.height, 720);
        assert_eq!(prefs.hub_config().boundary, "myboundary");
    }
}
