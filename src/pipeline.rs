//! Pipeline wiring
//!
//! Connects the three cooperative loops:
//!
//! ```text
//!   FrameSource ──watch──► SegmentationWorker ──watch──┐
//!        │                                             ▼
//!        └──────────────watch─────────────────────► Compositor ──► StreamHub
//! ```
//!
//! The capture task belongs to the `FrameSource`; the worker and compositor
//! tasks belong to the pipeline and run until `shutdown`.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::capture::{CaptureBackend, DeviceInfo, DeviceSelector, FrameSource};
use crate::compositor::{Compositor, CompositorConfig};
use crate::config::Preferences;
use crate::encode::{FrameEncoder, JpegEncoder};
use crate::error::Result;
use crate::hub::StreamHub;
use crate::segmentation::{SegmentationWorker, Segmenter};

/// Capture, segmentation and compositing feeding one stream hub
pub struct Pipeline {
    source: Arc<FrameSource>,
    worker: Arc<SegmentationWorker>,
    hub: Arc<StreamHub>,
    compositor_config: CompositorConfig,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Build a pipeline encoding with JPEG at the configured quality
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        segmenter: Arc<dyn Segmenter>,
        prefs: &Preferences,
    ) -> Self {
        let encoder = Arc::new(JpegEncoder::new(prefs.mjpeg_jpeg_quality));
        Self::with_encoder(backend, segmenter, encoder, prefs)
    }

    pub fn with_encoder(
        backend: Box<dyn CaptureBackend>,
        segmenter: Arc<dyn Segmenter>,
        encoder: Arc<dyn FrameEncoder>,
        prefs: &Preferences,
    ) -> Self {
        let source = Arc::new(FrameSource::new(backend, prefs.capture_constraints()));
        let worker = Arc::new(SegmentationWorker::new(
            source.frames(),
            segmenter,
            prefs.segmentation_options().clone(),
        ));
        let hub = Arc::new(StreamHub::with_config(encoder, prefs.hub_config()));

        Self {
            source,
            worker,
            hub,
            compositor_config: prefs.compositor_config(),
            tasks: Vec::new(),
        }
    }

    pub fn source(&self) -> &Arc<FrameSource> {
        &self.source
    }

    pub fn worker(&self) -> &Arc<SegmentationWorker> {
        &self.worker
    }

    pub fn hub(&self) -> &Arc<StreamHub> {
        &self.hub
    }

    /// Acquire a capture device and start the processing loops
    ///
    /// The loops are started once; a failed device acquisition leaves them
    /// idle and waiting for frames, so the server keeps serving.
    pub async fn start(&mut self, selector: &DeviceSelector) -> Result<DeviceInfo> {
        if self.tasks.is_empty() {
            self.spawn_loops();
        }

        let device = self.source.start(selector).await?;
        Ok(device)
    }

    /// Switch to another capture device
    pub async fn switch_device(&self, selector: &DeviceSelector) -> Result<DeviceInfo> {
        let device = self.source.switch_device(selector).await?;
        Ok(device)
    }

    /// Stop every loop, release the device and close all subscribers
    pub async fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.source.stop().await;
        self.hub.close_all();

        tracing::info!(
            frames_captured = self.source.frames_captured(),
            inferences = self.worker.inferences(),
            frames_published = self.hub.stats().frames_published,
            "Pipeline stopped"
        );
    }

    fn spawn_loops(&mut self) {
        let compositor = Compositor::new(
            self.source.frames(),
            self.worker.masks(),
            Arc::clone(&self.hub),
            self.compositor_config.clone(),
        );

        self.tasks
            .push(tokio::spawn(Arc::clone(&self.worker).run()));
        self.tasks.push(tokio::spawn(compositor.run()));
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::capture::{CaptureError, TestPatternBackend};
    use crate::encode::EncodeError;
    use crate::error::Error;
    use crate::frame::Frame;
    use crate::segmentation::LuminanceSegmenter;

    struct RawEncoder;

    impl FrameEncoder for RawEncoder {
        fn encode(&self, frame: &Frame) -> std::result::Result<Bytes, EncodeError> {
            Ok(Bytes::copy_from_slice(frame.as_bytes()))
        }
    }

    fn pipeline() -> Pipeline {
        let mut prefs = Preferences::default();
        prefs.presenter.width = 16;
        prefs.presenter.height = 8;

        Pipeline::with_encoder(
            Box::new(TestPatternBackend::new(100)),
            Arc::new(LuminanceSegmenter),
            Arc::new(RawEncoder),
            &prefs,
        )
    }

    #[tokio::test]
    async fn test_frames_reach_subscribers() {
        let mut pipeline = pipeline();
        let mut sub = pipeline.hub().subscribe();

        let device = pipeline.start(&DeviceSelector::Default).await.unwrap();
        assert_eq!(device.id, "pattern:0");

        let chunk = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(chunk.starts_with(b"--myboundary\r\nContent-Type: image/jpeg\r\n"));
        // 16x8 RGBA frame, encoded verbatim
        assert!(chunk.windows(19).any(|w| w == b"Content-Length: 512"));

        pipeline.shutdown().await;
        assert!(sub.recv().await.is_none());
        assert!(pipeline.source().current_frame().is_none());
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let mut pipeline = pipeline();

        let err = pipeline
            .start(&DeviceSelector::Id("missing".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Capture(CaptureError::DeviceUnavailable(_))
        ));

        // Loops stay up; a later start succeeds
        let device = pipeline
            .switch_device(&DeviceSelector::Label("Test Pattern".into()))
            .await
            .unwrap();
        assert_eq!(device.label, "Test Pattern");

        pipeline.shutdown().await;
    }
}
