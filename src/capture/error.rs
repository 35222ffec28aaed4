//! Capture error types

use thiserror::Error;

/// Capture subsystem errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// No device matches the selector
    #[error("no capture device matches {0}")]
    DeviceUnavailable(String),

    /// The host refused access to the device
    #[error("access to capture device denied: {0}")]
    PermissionDenied(String),

    /// The device stopped delivering frames
    #[error("capture device disconnected: {0}")]
    Disconnected(String),

    /// Backend-specific failure
    #[error("capture backend error: {0}")]
    Backend(String),
}
