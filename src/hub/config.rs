//! Hub configuration

/// Default multipart boundary token
pub const DEFAULT_BOUNDARY: &str = "myboundary";

/// Default number of consecutive skipped frames before a subscriber is dropped
pub const DEFAULT_MAX_SKIPPED_FRAMES: u32 = 15;

/// Configuration for the stream hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Boundary token separating multipart parts
    pub boundary: String,

    /// Consecutive frames a subscriber may miss while its sink is busy
    /// before it is removed (at least 1)
    pub max_skipped_frames: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            boundary: DEFAULT_BOUNDARY.to_string(),
            max_skipped_frames: DEFAULT_MAX_SKIPPED_FRAMES,
        }
    }
}

impl HubConfig {
    /// Set the multipart boundary token
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    /// Set the lag threshold
    pub fn max_skipped_frames(mut self, frames: u32) -> Self {
        self.max_skipped_frames = frames.max(1);
        self
    }
}
