//! Segmentation worker
//!
//! Runs inference back to back on whatever frame is current, publishing each
//! result as the latest mask. It is paced only by inference latency and never
//! waits for the compositor; the compositor in turn never waits for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::config::SegmentationOptions;
use super::segmenter::Segmenter;
use crate::capture::FrameReader;
use crate::frame::SegmentationMask;

/// Receiving side of the latest-mask channel
pub type MaskReader = watch::Receiver<Option<Arc<SegmentationMask>>>;

/// Result of one worker iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No frame was available
    NoFrame,
    /// A new mask was published
    Updated,
    /// Inference failed; the previous mask is kept
    Failed,
}

/// Continuously refreshes the latest segmentation mask
pub struct SegmentationWorker {
    frames: FrameReader,
    segmenter: Arc<dyn Segmenter>,
    options: SegmentationOptions,
    masks: watch::Sender<Option<Arc<SegmentationMask>>>,
    inferences: AtomicU64,
    failures: AtomicU64,
}

impl SegmentationWorker {
    pub fn new(
        frames: FrameReader,
        segmenter: Arc<dyn Segmenter>,
        options: SegmentationOptions,
    ) -> Self {
        let (masks, _) = watch::channel(None);

        Self {
            frames,
            segmenter,
            options,
            masks,
            inferences: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Most recent successfully computed mask
    pub fn latest_mask(&self) -> Option<Arc<SegmentationMask>> {
        self.masks.borrow().clone()
    }

    /// Subscribe to mask updates
    pub fn masks(&self) -> MaskReader {
        self.masks.subscribe()
    }

    /// Options passed to every inference call
    pub fn options(&self) -> &SegmentationOptions {
        &self.options
    }

    /// Successful inference calls
    pub fn inferences(&self) -> u64 {
        self.inferences.load(Ordering::Relaxed)
    }

    /// Failed inference calls
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Run inference once on the current frame
    pub async fn step(&self) -> StepOutcome {
        let frame = self.frames.borrow().clone();
        let Some(frame) = frame else {
            return StepOutcome::NoFrame;
        };

        match self.segmenter.segment(&frame, &self.options).await {
            Ok(mask) => {
                tracing::trace!(
                    width = mask.width(),
                    height = mask.height(),
                    foreground = mask.foreground_count(),
                    "Mask updated"
                );
                self.masks.send_replace(Some(Arc::new(mask)));
                self.inferences.fetch_add(1, Ordering::Relaxed);
                StepOutcome::Updated
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    error = %e,
                    failures = failures,
                    "Segmentation failed, keeping previous mask"
                );
                StepOutcome::Failed
            }
        }
    }

    /// Loop until the frame source goes away
    pub async fn run(self: Arc<Self>) {
        let mut frames = self.frames.clone();
        tracing::debug!("Segmentation worker started");

        loop {
            match self.step().await {
                StepOutcome::NoFrame => {
                    if frames.changed().await.is_err() {
                        break;
                    }
                }
                StepOutcome::Updated | StepOutcome::Failed => tokio::task::yield_now().await,
            }
        }

        tracing::debug!("Segmentation worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use super::*;
    use crate::frame::{Frame, Rgba, BACKGROUND, FOREGROUND};
    use crate::segmentation::InferenceError;

    /// Alternates labels each call and fails on the configured call number
    struct ScriptedSegmenter {
        calls: AtomicU32,
        fail_on: u32,
    }

    #[async_trait]
    impl Segmenter for ScriptedSegmenter {
        async fn segment(
            &self,
            frame: &Frame,
            _options: &SegmentationOptions,
        ) -> Result<SegmentationMask, InferenceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(InferenceError::ResourceExhausted("out of memory".into()));
            }
            let label = if call % 2 == 0 { FOREGROUND } else { BACKGROUND };
            Ok(SegmentationMask::uniform(frame.width(), frame.height(), label))
        }
    }

    fn worker(
        frame: Option<Frame>,
        fail_on: u32,
    ) -> (SegmentationWorker, watch::Sender<Option<Arc<Frame>>>) {
        let (tx, rx) = watch::channel(frame.map(Arc::new));
        let segmenter = Arc::new(ScriptedSegmenter {
            calls: AtomicU32::new(0),
            fail_on,
        });
        (
            SegmentationWorker::new(rx, segmenter, SegmentationOptions::default()),
            tx,
        )
    }

    #[tokio::test]
    async fn test_no_frame() {
        let (worker, _tx) = worker(None, 0);

        assert_eq!(worker.step().await, StepOutcome::NoFrame);
        assert!(worker.latest_mask().is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_mask() {
        let (worker, _tx) = worker(Some(Frame::filled(2, 1, Rgba::TRANSPARENT)), 5);

        for _ in 0..4 {
            assert_eq!(worker.step().await, StepOutcome::Updated);
        }
        let fourth = worker.latest_mask().unwrap();
        assert_eq!(fourth.labels(), &[FOREGROUND, FOREGROUND]);

        assert_eq!(worker.step().await, StepOutcome::Failed);
        let fifth = worker.latest_mask().unwrap();
        assert!(Arc::ptr_eq(&fourth, &fifth));
        assert_eq!(worker.failures(), 1);

        // Recovers on the next iteration
        assert_eq!(worker.step().await, StepOutcome::Updated);
        assert_eq!(worker.inferences(), 5);
    }

    #[tokio::test]
    async fn test_failure_before_any_mask() {
        let (worker, _tx) = worker(Some(Frame::filled(1, 1, Rgba::TRANSPARENT)), 1);

        assert_eq!(worker.step().await, StepOutcome::Failed);
        assert!(worker.latest_mask().is_none());
    }

    #[tokio::test]
    async fn test_run_waits_for_frame() {
        let (worker, tx) = worker(None, 0);
        let worker = Arc::new(worker);
        let mut masks = worker.masks();

        let handle = tokio::spawn(Arc::clone(&worker).run());
        tokio::task::yield_now().await;
        assert!(worker.latest_mask().is_none());

        tx.send_replace(Some(Arc::new(Frame::filled(3, 2, Rgba::TRANSPARENT))));
        masks.changed().await.unwrap();

        let mask = worker.latest_mask().unwrap();
        assert_eq!(mask.dimensions(), (3, 2));

        handle.abort();
    }
}
