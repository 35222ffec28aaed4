//! narrator: camera background removal as a live MJPEG stream
//!
//! A single capture device feeds three cooperative loops: frame read-back,
//! person segmentation and compositing. Composited frames are encoded once
//! and fanned out to any number of HTTP viewers as a
//! `multipart/x-mixed-replace` stream, with per-viewer latest-frame-wins
//! backpressure so a slow viewer never holds back the others.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use narrator::capture::{DeviceSelector, TestPatternBackend};
//! use narrator::segmentation::LuminanceSegmenter;
//! use narrator::{Pipeline, Preferences, StreamServer};
//!
//! # async fn run() -> narrator::Result<()> {
//! let prefs = Preferences::load("preferences.json")?;
//! let mut pipeline = Pipeline::new(
//!     Box::new(TestPatternBackend::default()),
//!     Arc::new(LuminanceSegmenter),
//!     &prefs,
//! );
//! pipeline.start(&DeviceSelector::Default).await?;
//!
//! let server = StreamServer::new(prefs.server_config(), Arc::clone(pipeline.hub()));
//! server.run().await
//! # }
//! ```

pub mod capture;
pub mod compositor;
pub mod config;
pub mod encode;
pub mod error;
pub mod frame;
pub mod hub;
pub mod pipeline;
pub mod segmentation;
pub mod server;
pub mod stats;

pub use config::Preferences;
pub use error::{Error, Result};
pub use hub::{StreamHub, Subscription};
pub use pipeline::Pipeline;
pub use server::{ServerConfig, StreamServer};
