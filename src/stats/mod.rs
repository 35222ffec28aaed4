//! Runtime statistics

pub mod metrics;

pub use metrics::{HubStats, ServerStats, SubscriberStats};
pub(crate) use metrics::{HubCounters, ServerCounters};
