//! Multi-viewer stream hub
//!
//! The hub takes composited frames, encodes each one to JPEG exactly once,
//! wraps it as a `multipart/x-mixed-replace` part and offers that single
//! chunk to every connected viewer.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<StreamHub>
//!                   ┌──────────────────────────┐
//!   publish(frame)  │ encoder (spawn_blocking) │
//!  ───────────────► │ subscribers: HashMap<    │
//!                   │   SubscriberId, Mailbox> │
//!                   │ latest: EncodedFrame     │
//!                   └────────────┬─────────────┘
//!                                │ offer(chunk)
//!          ┌─────────────────────┼─────────────────────┐
//!          ▼                     ▼                     ▼
//!     [Mailbox]             [Mailbox]             [Mailbox]
//!     recv() ─► TCP         recv() ─► TCP         recv() ─► TCP
//! ```
//!
//! # Backpressure
//!
//! Each mailbox holds at most one waiting chunk. A viewer that is still
//! writing when the next frame arrives has its waiting chunk replaced, so it
//! always resumes at the newest frame. After `max_skipped_frames` consecutive
//! replacements the viewer is dropped. Other viewers are never held back.
//!
//! # Zero-Copy Design
//!
//! Chunks are `bytes::Bytes`; every mailbox holds a reference to the same
//! allocation.

pub mod config;
pub mod multipart;
pub mod store;
pub mod subscriber;

pub use config::HubConfig;
pub use store::{EncodedFrame, PublishReport, StreamHub};
pub use subscriber::{CloseReason, SubscriberId, SubscriberPhase, Subscription};
