//! Frame source
//!
//! Owns the capture device and republishes its frames as a latest-value
//! channel. The device itself lives inside a dedicated capture task; the rest
//! of the pipeline only ever sees immutable `Arc<Frame>` snapshots.
//!
//! Each start bumps a generation counter. The capture task publishes a frame
//! only while its generation is current, so a frame read back from a device
//! that is being stopped can never reappear after `stop()` has cleared the
//! slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::device::{CaptureBackend, CaptureConstraints, CaptureDevice, DeviceInfo, DeviceSelector};
use super::error::CaptureError;
use crate::frame::Frame;

/// Receiving side of the latest-frame channel
pub type FrameReader = watch::Receiver<Option<Arc<Frame>>>;

struct ActiveCapture {
    device: DeviceInfo,
    task: JoinHandle<()>,
}

/// Live capture source exposing the most recent raw frame
pub struct FrameSource {
    backend: Box<dyn CaptureBackend>,
    constraints: CaptureConstraints,
    latest: Arc<watch::Sender<Option<Arc<Frame>>>>,
    generation: Arc<AtomicU64>,
    frames_captured: Arc<AtomicU64>,
    active: Mutex<Option<ActiveCapture>>,
}

impl FrameSource {
    /// Create an idle source; call [`start`](Self::start) to acquire a device
    pub fn new(backend: Box<dyn CaptureBackend>, constraints: CaptureConstraints) -> Self {
        let (tx, _) = watch::channel(None);

        Self {
            backend,
            constraints,
            latest: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
            frames_captured: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
        }
    }

    /// Most recent frame, or `None` while no device is delivering
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.latest.borrow().clone()
    }

    /// Subscribe to frame updates
    pub fn frames(&self) -> FrameReader {
        self.latest.subscribe()
    }

    /// Total frames published since creation
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    /// Acquire a device and start the capture task
    ///
    /// Any running capture is stopped first.
    pub async fn start(&self, selector: &DeviceSelector) -> Result<DeviceInfo, CaptureError> {
        let mut active = self.active.lock().await;
        self.release(&mut active);

        let devices = self.backend.enumerate_devices().await?;
        let device = selector
            .resolve(&devices)
            .cloned()
            .ok_or_else(|| CaptureError::DeviceUnavailable(selector.to_string()))?;

        let constraints = CaptureConstraints {
            facing_mode: selector.facing_mode(),
            ..self.constraints
        };
        let capture = self.backend.open(&device, &constraints).await?;
        let (width, height) = capture.dimensions();

        let epoch = self.generation.load(Ordering::Acquire);
        let task = tokio::spawn(capture_loop(
            capture,
            Arc::clone(&self.latest),
            Arc::clone(&self.generation),
            epoch,
            device.clone(),
            Arc::clone(&self.frames_captured),
        ));

        tracing::info!(
            device = %device.label,
            id = %device.id,
            width = width,
            height = height,
            "Capture started"
        );

        *active = Some(ActiveCapture {
            device: device.clone(),
            task,
        });

        Ok(device)
    }

    /// Release the device; safe to call when nothing is running
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        self.release(&mut active);
    }

    /// Stop the current device and start the one matching `selector`
    pub async fn switch_device(
        &self,
        selector: &DeviceSelector,
    ) -> Result<DeviceInfo, CaptureError> {
        self.stop().await;
        self.start(selector).await
    }

    /// Device currently held, if its capture task is still running
    pub async fn active_device(&self) -> Option<DeviceInfo> {
        let active = self.active.lock().await;
        active
            .as_ref()
            .filter(|capture| !capture.task.is_finished())
            .map(|capture| capture.device.clone())
    }

    /// Whether a capture task is running
    pub async fn is_running(&self) -> bool {
        self.active_device().await.is_some()
    }

    fn release(&self, active: &mut Option<ActiveCapture>) {
        self.generation.fetch_add(1, Ordering::AcqRel);

        if let Some(capture) = active.take() {
            capture.task.abort();
            tracing::info!(device = %capture.device.label, "Capture stopped");
        }

        self.latest.send_replace(None);
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        if let Some(capture) = self.active.get_mut().take() {
            capture.task.abort();
        }
    }
}

async fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    latest: Arc<watch::Sender<Option<Arc<Frame>>>>,
    generation: Arc<AtomicU64>,
    epoch: u64,
    info: DeviceInfo,
    frames_captured: Arc<AtomicU64>,
) {
    loop {
        match device.next_frame().await {
            Ok(frame) => {
                let frame = Arc::new(frame);
                let published = latest.send_if_modified(|slot| {
                    if generation.load(Ordering::Acquire) != epoch {
                        return false;
                    }
                    *slot = Some(frame);
                    true
                });

                if !published {
                    break;
                }
                frames_captured.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(device = %info.label, error = %e, "Capture device failed");
                latest.send_if_modified(|slot| {
                    if generation.load(Ordering::Acquire) != epoch {
                        return false;
                    }
                    *slot = None;
                    true
                });
                break;
            }
        }
    }
}
