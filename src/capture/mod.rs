//! Frame capture
//!
//! The capture device is abstracted behind `CaptureBackend`/`CaptureDevice`
//! so the pipeline never depends on a platform capture API or a display
//! surface. `FrameSource` owns the opened device and exposes the latest frame
//! to the rest of the pipeline.
//!
//! ```text
//!   CaptureBackend ──open()──► CaptureDevice ──next_frame()──┐
//!                                                            │ capture task
//!                                                            ▼
//!   FrameSource.current_frame() ◄── watch<Option<Arc<Frame>>>
//! ```

pub mod device;
pub mod error;
pub mod pattern;
pub mod source;

pub use device::{
    CaptureBackend, CaptureConstraints, CaptureDevice, DeviceInfo, DeviceSelector, FacingMode,
};
pub use error::CaptureError;
pub use pattern::TestPatternBackend;
pub use source::{FrameReader, FrameSource};
