//! Stream hub implementation
//!
//! The hub owns the subscriber set and fans every published frame out to it.
//! A frame is encoded exactly once per publish; all subscribers receive a
//! reference to the same multipart chunk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::config::HubConfig;
use super::multipart;
use super::subscriber::{CloseReason, Mailbox, Offer, SubscriberId, Subscription};
use crate::encode::{EncodeError, FrameEncoder};
use crate::frame::Frame;
use crate::stats::{HubCounters, HubStats};

/// Most recently encoded frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Publish sequence number, starting at 1
    pub sequence: u64,
    /// MIME type of `data`
    pub content_type: &'static str,
    /// Encoded image
    pub data: Bytes,
}

/// What a single publish did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub sequence: u64,
    /// Subscribers that got the chunk into an idle slot
    pub queued: usize,
    /// Subscribers whose waiting chunk was replaced
    pub replaced: usize,
    /// Subscribers removed for lagging
    pub dropped: usize,
}

/// Fan-out point between the compositor and the viewers
///
/// Thread-safe via `parking_lot::Mutex`. Locks are held only for bookkeeping,
/// never across an await or while encoding.
pub struct StreamHub {
    config: HubConfig,
    encoder: Arc<dyn FrameEncoder>,
    subscribers: Mutex<HashMap<SubscriberId, Arc<Mailbox>>>,
    latest: Mutex<Option<EncodedFrame>>,
    next_id: AtomicU64,
    next_sequence: AtomicU64,
    closed: AtomicBool,
    counters: HubCounters,
}

impl StreamHub {
    /// Create a hub with default configuration
    pub fn new(encoder: Arc<dyn FrameEncoder>) -> Self {
        Self::with_config(encoder, HubConfig::default())
    }

    pub fn with_config(encoder: Arc<dyn FrameEncoder>, config: HubConfig) -> Self {
        Self {
            config,
            encoder,
            subscribers: Mutex::new(HashMap::new()),
            latest: Mutex::new(None),
            next_id: AtomicU64::new(1),
            next_sequence: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            counters: HubCounters::default(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Content type of the multipart response
    pub fn content_type(&self) -> String {
        multipart::content_type(&self.config.boundary)
    }

    /// Register a new subscriber
    ///
    /// The subscriber receives frames published after this call. A publish
    /// already in progress is not delivered to it. Once the hub has been shut
    /// down with `close_all`, the returned subscription is already removed.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mailbox = Arc::new(Mailbox::new());

        let subscribers = {
            let mut subscribers = self.subscribers.lock();
            if self.closed.load(Ordering::Acquire) {
                None
            } else {
                subscribers.insert(id, Arc::clone(&mailbox));
                Some(subscribers.len())
            }
        };

        let Some(subscribers) = subscribers else {
            mailbox.close(CloseReason::Shutdown);
            tracing::debug!(subscriber = %id, "Subscribe rejected: hub closed");
            return Subscription::new(id, mailbox, Arc::clone(self));
        };

        tracing::info!(subscriber = %id, subscribers = subscribers, "Subscriber added");

        Subscription::new(id, mailbox, Arc::clone(self))
    }

    /// Remove a subscriber
    ///
    /// Idempotent: returns false if the id is not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.close_subscriber(id, CloseReason::Unsubscribed)
    }

    pub(crate) fn close_subscriber(&self, id: SubscriberId, reason: CloseReason) -> bool {
        let (mailbox, remaining) = {
            let mut subscribers = self.subscribers.lock();
            let mailbox = subscribers.remove(&id);
            (mailbox, subscribers.len())
        };

        let Some(mailbox) = mailbox else {
            return false;
        };
        mailbox.close(reason);

        if matches!(reason, CloseReason::Lagging | CloseReason::WriteFailed) {
            self.counters
                .subscribers_dropped
                .fetch_add(1, Ordering::Relaxed);
        }

        tracing::debug!(
            subscriber = %id,
            reason = %reason,
            subscribers = remaining,
            "Subscriber removed"
        );

        true
    }

    /// Encode a frame once and offer it to every current subscriber
    ///
    /// The subscriber set is captured before encoding. An encode failure
    /// skips this frame without touching any subscriber.
    pub async fn publish(&self, frame: Frame) -> Result<PublishReport, EncodeError> {
        let targets: Vec<(SubscriberId, Arc<Mailbox>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(id, mailbox)| (*id, Arc::clone(mailbox)))
            .collect();

        let encoder = Arc::clone(&self.encoder);
        let encoded = tokio::task::spawn_blocking(move || encoder.encode(&frame))
            .await
            .map_err(|e| EncodeError::Task(e.to_string()))
            .and_then(|result| result);

        let data = match encoded {
            Ok(data) => data,
            Err(e) => {
                self.counters.encode_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Frame encode failed, skipping");
                return Err(e);
            }
        };

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let content_type = self.encoder.content_type();
        let chunk = multipart::encode_part(&self.config.boundary, content_type, &data);

        self.counters
            .bytes_encoded
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        self.counters.frames_published.fetch_add(1, Ordering::Relaxed);
        *self.latest.lock() = Some(EncodedFrame {
            sequence,
            content_type,
            data,
        });

        let mut report = PublishReport {
            sequence,
            ..PublishReport::default()
        };

        for (id, mailbox) in targets {
            match mailbox.offer(&chunk, self.config.max_skipped_frames) {
                Offer::Queued => report.queued += 1,
                Offer::Replaced => {
                    report.replaced += 1;
                    self.counters.chunks_skipped.fetch_add(1, Ordering::Relaxed);
                }
                Offer::Lagging => {
                    report.dropped += 1;
                    self.counters.chunks_skipped.fetch_add(1, Ordering::Relaxed);
                    self.close_subscriber(id, CloseReason::Lagging);
                }
                Offer::Closed => {}
            }
        }

        tracing::trace!(
            sequence = sequence,
            bytes = chunk.len(),
            queued = report.queued,
            replaced = report.replaced,
            dropped = report.dropped,
            "Frame published"
        );

        Ok(report)
    }

    /// Most recently encoded frame, if any
    pub fn latest_frame(&self) -> Option<EncodedFrame> {
        self.latest.lock().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn stats(&self) -> HubStats {
        self.counters.snapshot(self.subscriber_count())
    }

    /// Whether `close_all` has shut the hub down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Remove every subscriber and refuse new ones
    pub fn close_all(&self) -> usize {
        let drained: Vec<(SubscriberId, Arc<Mailbox>)> = {
            let mut subscribers = self.subscribers.lock();
            self.closed.store(true, Ordering::Release);
            subscribers.drain().collect()
        };

        for (_, mailbox) in &drained {
            mailbox.close(CloseReason::Shutdown);
        }

        if !drained.is_empty() {
            tracing::info!(subscribers = drained.len(), "Closed all subscribers");
        }
        drained.len()
    }
}
