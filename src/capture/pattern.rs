//! Synthetic capture backend
//!
//! Produces an animated test pattern: a bright square sliding across a dark
//! gradient. The square is bright enough for `LuminanceSegmenter` to pick it
//! out as foreground, which makes the whole pipeline observable without a
//! camera attached.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Interval, MissedTickBehavior};

use super::device::{CaptureBackend, CaptureConstraints, CaptureDevice, DeviceInfo};
use super::error::CaptureError;
use crate::frame::Frame;

const PATTERN_DEVICE_ID: &str = "pattern:0";
const PATTERN_DEVICE_LABEL: &str = "Test Pattern";

const SUBJECT_COLOR: [u8; 4] = [235, 200, 170, 255];

/// Backend exposing a single synthetic device
#[derive(Debug, Clone)]
pub struct TestPatternBackend {
    frame_rate: u32,
}

impl TestPatternBackend {
    /// Create a backend producing frames at `frame_rate` per second
    pub fn new(frame_rate: u32) -> Self {
        Self {
            frame_rate: frame_rate.max(1),
        }
    }
}

impl Default for TestPatternBackend {
    fn default() -> Self {
        Self::new(30)
    }
}

#[async_trait]
impl CaptureBackend for TestPatternBackend {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        Ok(vec![DeviceInfo::new(PATTERN_DEVICE_ID, PATTERN_DEVICE_LABEL)])
    }

    async fn open(
        &self,
        device: &DeviceInfo,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        if device.id != PATTERN_DEVICE_ID {
            return Err(CaptureError::DeviceUnavailable(device.id.clone()));
        }

        let mut ticker =
            tokio::time::interval(Duration::from_secs_f64(1.0 / self.frame_rate as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Ok(Box::new(PatternDevice {
            width: constraints.width.max(1),
            height: constraints.height.max(1),
            ticker,
            tick: 0,
        }))
    }
}

struct PatternDevice {
    width: u32,
    height: u32,
    ticker: Interval,
    tick: u64,
}

#[async_trait]
impl CaptureDevice for PatternDevice {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.ticker.tick().await;
        let frame = render(self.width, self.height, self.tick);
        self.tick += 1;
        Ok(frame)
    }
}

/// Render one pattern frame
pub(crate) fn render(width: u32, height: u32, tick: u64) -> Frame {
    let size = (width.min(height) / 3).max(1);
    let travel = width.saturating_sub(size).max(1) as u64;
    let left = ((tick * 4) % travel) as u32;
    let top = height.saturating_sub(size) / 2;

    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let inside = x >= left && x < left + size && y >= top && y < top + size;
            if inside {
                data.extend_from_slice(&SUBJECT_COLOR);
            } else {
                let shade = (x as u64 * 64 / width as u64) as u8;
                data.extend_from_slice(&[shade / 2, shade / 2, shade, 255]);
            }
        }
    }

    Frame::from_raw(width, height, data)
}
