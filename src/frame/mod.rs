//! Pixel data passed between pipeline stages
//!
//! This module provides:
//! - `Frame`: an immutable RGBA pixel grid (raw capture or composited output)
//! - `SegmentationMask`: per-pixel foreground/background labels aligned to a frame
//!
//! Frames are shared between tasks as `Arc<Frame>` and never mutated after
//! construction, so a reader can never observe a half-written buffer.

pub mod buffer;
pub mod mask;

pub use buffer::{Frame, FrameError, Rgba};
pub use mask::{SegmentationMask, BACKGROUND, FOREGROUND};
