//! Capture backend traits and device selection
//!
//! A `CaptureBackend` is the platform capability that lists devices and opens
//! them. An opened `CaptureDevice` is owned exclusively by the frame source's
//! capture task and yields frames until it is dropped.

use std::fmt;

use async_trait::async_trait;

use super::error::CaptureError;
use crate::frame::Frame;

/// Which way a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Front camera, facing the presenter
    #[default]
    User,
    /// Rear camera
    Environment,
}

impl FacingMode {
    /// Infer the facing mode from a device label
    ///
    /// Labels mentioning "back" are rear cameras; everything else, including
    /// no label at all, is treated as user-facing.
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some(label) if label.to_lowercase().contains("back") => FacingMode::Environment,
            _ => FacingMode::User,
        }
    }
}

/// A device reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Backend-specific device ID
    pub id: String,
    /// Human readable label
    pub label: String,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// How to pick a capture device
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// First device the backend reports
    #[default]
    Default,
    /// Exact device ID
    Id(String),
    /// Exact device label
    Label(String),
}

impl DeviceSelector {
    /// Pick the matching device from a backend listing
    pub fn resolve<'a>(&self, devices: &'a [DeviceInfo]) -> Option<&'a DeviceInfo> {
        match self {
            DeviceSelector::Default => devices.first(),
            DeviceSelector::Id(id) => devices.iter().find(|d| &d.id == id),
            DeviceSelector::Label(label) => devices.iter().find(|d| &d.label == label),
        }
    }

    /// Facing mode implied by this selector
    pub fn facing_mode(&self) -> FacingMode {
        match self {
            DeviceSelector::Label(label) => FacingMode::from_label(Some(label)),
            _ => FacingMode::User,
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Default => write!(f, "default device"),
            DeviceSelector::Id(id) => write!(f, "device id '{}'", id),
            DeviceSelector::Label(label) => write!(f, "device label '{}'", label),
        }
    }
}

/// Requested capture parameters
///
/// Backends treat the resolution as a preference, not a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            facing_mode: FacingMode::User,
        }
    }
}

/// Platform capture capability
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// List connected video input devices
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError>;

    /// Acquire a device
    ///
    /// Resolves once the device has reported its frame metadata.
    async fn open(
        &self,
        device: &DeviceInfo,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// An acquired capture device
///
/// Dropping the device releases it.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Negotiated frame dimensions
    fn dimensions(&self) -> (u32, u32);

    /// Wait for the next frame
    async fn next_frame(&mut self) -> Result<Frame, CaptureError>;
}
