//! Statistics and metrics for the streaming pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-subscriber statistics
#[derive(Debug, Clone)]
pub struct SubscriberStats {
    /// When the subscriber joined the hub
    pub connected_at: Instant,
    /// Chunks handed to the sink
    pub chunks_delivered: u64,
    /// Bytes handed to the sink
    pub bytes_delivered: u64,
    /// Chunks replaced or discarded while the sink was busy
    pub frames_skipped: u64,
}

impl SubscriberStats {
    pub fn new() -> Self {
        Self {
            connected_at: Instant::now(),
            chunks_delivered: 0,
            bytes_delivered: 0,
            frames_skipped: 0,
        }
    }

    /// Time since the subscriber joined
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Delivered bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_delivered * 8) / secs
        } else {
            0
        }
    }
}

impl Default for SubscriberStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub-wide statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Currently registered subscribers
    pub subscribers: usize,
    /// Frames encoded and broadcast
    pub frames_published: u64,
    /// Frames whose encode failed
    pub encode_failures: u64,
    /// Encoded bytes produced (one copy per frame)
    pub bytes_encoded: u64,
    /// Chunks replaced or discarded for busy subscribers
    pub chunks_skipped: u64,
    /// Subscribers removed for lagging or failed writes
    pub subscribers_dropped: u64,
}

/// Lock-free counters behind `HubStats`
#[derive(Debug, Default)]
pub(crate) struct HubCounters {
    pub frames_published: AtomicU64,
    pub encode_failures: AtomicU64,
    pub bytes_encoded: AtomicU64,
    pub chunks_skipped: AtomicU64,
    pub subscribers_dropped: AtomicU64,
}

impl HubCounters {
    pub fn snapshot(&self, subscribers: usize) -> HubStats {
        HubStats {
            subscribers,
            frames_published: self.frames_published.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            bytes_encoded: self.bytes_encoded.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
            subscribers_dropped: self.subscribers_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Connections refused at the connection limit
    pub rejected_connections: u64,
    /// Total bytes written to viewers
    pub total_bytes_sent: u64,
}

/// Lock-free counters behind `ServerStats`
#[derive(Debug, Default)]
pub(crate) struct ServerCounters {
    pub total_connections: AtomicU64,
    pub active_connections: AtomicU64,
    pub rejected_connections: AtomicU64,
    pub total_bytes_sent: AtomicU64,
}

impl ServerCounters {
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            total_bytes_sent: self.total_bytes_sent.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_stats_new() {
        let stats = SubscriberStats::new();
        assert_eq!(stats.chunks_delivered, 0);
        assert_eq!(stats.bytes_delivered, 0);
        assert_eq!(stats.frames_skipped, 0);
    }

    #[test]
    fn test_subscriber_bitrate() {
        let mut stats = SubscriberStats::new();
        stats.bytes_delivered = 1_000_000;
        stats.connected_at = Instant::now() - Duration::from_secs(10);

        // 1,000,000 bytes * 8 bits / 10 seconds
        assert_eq!(stats.bitrate(), 800_000);
    }

    #[test]
    fn test_subscriber_bitrate_zero_duration() {
        let mut stats = SubscriberStats::new();
        stats.bytes_delivered = 1_000_000;

        assert_eq!(stats.bitrate(), 0);
    }

    #[test]
    fn test_hub_counters_snapshot() {
        let counters = HubCounters::default();
        counters.frames_published.fetch_add(3, Ordering::Relaxed);
        counters.encode_failures.fetch_add(1, Ordering::Relaxed);
        counters.subscribers_dropped.fetch_add(2, Ordering::Relaxed);

        let stats = counters.snapshot(4);
        assert_eq!(stats.subscribers, 4);
        assert_eq!(stats.frames_published, 3);
        assert_eq!(stats.encode_failures, 1);
        assert_eq!(stats.subscribers_dropped, 2);
        assert_eq!(stats.chunks_skipped, 0);
    }

    #[test]
    fn test_server_counters_snapshot() {
        let counters = ServerCounters::default();
        counters.total_connections.fetch_add(5, Ordering::Relaxed);
        counters.active_connections.fetch_add(2, Ordering::Relaxed);

        let stats = counters.snapshot();
        assert_eq!(stats.total_connections, 5);
        assert_eq!(stats.active_connections, 2);
        assert_eq!(stats.rejected_connections, 0);
    }
}
