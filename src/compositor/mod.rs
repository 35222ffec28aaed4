//! Background removal compositor
//!
//! Combines the latest raw frame with the latest segmentation mask and hands
//! the result to the stream hub. The mask may lag the frame by any number of
//! cycles; a mask whose dimensions no longer match is ignored and the whole
//! frame is treated as background until the worker catches up.

use std::sync::Arc;
use std::time::Duration;

use crate::capture::FrameReader;
use crate::frame::{Frame, Rgba, SegmentationMask};
use crate::hub::StreamHub;
use crate::segmentation::MaskReader;

/// Compositor configuration
#[derive(Debug, Clone, Default)]
pub struct CompositorConfig {
    /// Colour written for background pixels
    pub background: Rgba,

    /// Upper bound on published frames per second (`None` = unbounded)
    pub max_frame_rate: Option<u32>,
}

impl CompositorConfig {
    pub fn background(mut self, background: Rgba) -> Self {
        self.background = background;
        self
    }

    pub fn max_frame_rate(mut self, fps: Option<u32>) -> Self {
        self.max_frame_rate = fps.filter(|fps| *fps > 0);
        self
    }

    fn frame_interval(&self) -> Option<Duration> {
        self.max_frame_rate
            .map(|fps| Duration::from_secs(1) / fps.max(1))
    }
}

/// Replace every background pixel of `frame` with `background`
///
/// A missing or dimension-mismatched mask yields an all-background frame.
pub fn composite(frame: &Frame, mask: Option<&SegmentationMask>, background: Rgba) -> Frame {
    let (width, height) = frame.dimensions();
    let fill = background.to_array();

    let mask = match mask {
        Some(mask) if mask.matches(frame) => mask,
        _ => return Frame::filled(width, height, background),
    };

    let mut out = Vec::with_capacity(frame.as_bytes().len());
    for (index, px) in frame.as_bytes().chunks_exact(4).enumerate() {
        if mask.is_foreground(index) {
            out.extend_from_slice(px);
        } else {
            out.extend_from_slice(&fill);
        }
    }

    Frame::from_raw(width, height, out)
}

/// Per-frame compositing loop
pub struct Compositor {
    frames: FrameReader,
    masks: MaskReader,
    hub: Arc<StreamHub>,
    config: CompositorConfig,
}

impl Compositor {
    pub fn new(
        frames: FrameReader,
        masks: MaskReader,
        hub: Arc<StreamHub>,
        config: CompositorConfig,
    ) -> Self {
        Self {
            frames,
            masks,
            hub,
            config,
        }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Composite and publish one frame
    ///
    /// Returns false when no frame was available.
    pub async fn step(&self) -> bool {
        let frame = self.frames.borrow().clone();
        let Some(frame) = frame else {
            return false;
        };
        let mask = self.masks.borrow().clone();

        if let Some(mask) = mask.as_deref() {
            if !mask.matches(&frame) {
                tracing::trace!(
                    frame = ?frame.dimensions(),
                    mask = ?mask.dimensions(),
                    "Mask size mismatch, compositing as background"
                );
            }
        }

        let output = composite(&frame, mask.as_deref(), self.config.background);
        drop(frame);

        // Encode failures are logged by the hub and skip only this cycle
        let _ = self.hub.publish(output).await;
        true
    }

    /// Loop until the frame source goes away
    pub async fn run(self) {
        let mut frames = self.frames.clone();
        let interval = self.config.frame_interval();
        tracing::debug!(max_frame_rate = ?self.config.max_frame_rate, "Compositor started");

        loop {
            if !self.step().await {
                if frames.changed().await.is_err() {
                    break;
                }
                continue;
            }

            match interval {
                Some(interval) => tokio::time::sleep(interval).await,
                None => tokio::task::yield_now().await,
            }
        }

        tracing::debug!("Compositor stopped");
    }
}
