//! Subscriber state and delivery slot
//!
//! Each subscriber owns a single-slot mailbox. The hub offers every encoded
//! chunk to the slot; if the subscriber is still writing an earlier chunk the
//! offer replaces whatever is waiting, so a slow viewer always resumes from
//! the most recent frame. Missing `max_skipped_frames` offers in a row marks
//! the subscriber as lagging and the hub drops it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::store::StreamHub;
use crate::stats::SubscriberStats;

/// Unique subscriber identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Lifecycle of a subscriber
///
/// ```text
/// Connecting ──► Active ──► Draining ──► Removed
///      │            │
///      └────────────┴─────► Dropped ───► Removed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberPhase {
    /// Registered, first chunk not yet requested
    Connecting,
    /// Receiving chunks
    Active,
    /// Closing by request
    Draining,
    /// Closing after a failure or excessive lag
    Dropped,
    /// No longer in the hub
    Removed,
}

impl SubscriberPhase {
    /// Whether `next` is a legal successor of this phase
    pub fn can_transition_to(self, next: SubscriberPhase) -> bool {
        use SubscriberPhase::*;
        matches!(
            (self, next),
            (Connecting, Active)
                | (Connecting, Draining)
                | (Connecting, Dropped)
                | (Active, Draining)
                | (Active, Dropped)
                | (Draining, Removed)
                | (Dropped, Removed)
        )
    }

    /// Whether the subscriber still accepts chunks
    pub fn is_open(self) -> bool {
        matches!(self, SubscriberPhase::Connecting | SubscriberPhase::Active)
    }
}

/// Why a subscriber left the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The viewer disconnected or the subscription was dropped
    Unsubscribed,
    /// The hub was shut down
    Shutdown,
    /// Writing to the viewer failed
    WriteFailed,
    /// Too many consecutive frames skipped
    Lagging,
}

impl CloseReason {
    fn closing_phase(self) -> SubscriberPhase {
        match self {
            CloseReason::Unsubscribed | CloseReason::Shutdown => SubscriberPhase::Draining,
            CloseReason::WriteFailed | CloseReason::Lagging => SubscriberPhase::Dropped,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::Unsubscribed => "unsubscribed",
            CloseReason::Shutdown => "shutdown",
            CloseReason::WriteFailed => "write failed",
            CloseReason::Lagging => "lagging",
        };
        f.write_str(reason)
    }
}

/// Outcome of offering a chunk to a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Slot was idle; chunk queued
    Queued,
    /// Sink busy; waiting chunk replaced
    Replaced,
    /// Sink busy for too long; subscriber must be removed
    Lagging,
    /// Subscriber already closing
    Closed,
}

struct MailboxState {
    phase: SubscriberPhase,
    pending: Option<Bytes>,
    in_flight: bool,
    skipped: u32,
    close_reason: Option<CloseReason>,
    stats: SubscriberStats,
}

impl MailboxState {
    fn transition(&mut self, next: SubscriberPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal subscriber transition {:?} -> {:?}",
            self.phase,
            next
        );
        self.phase = next;
    }
}

pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState {
                phase: SubscriberPhase::Connecting,
                pending: None,
                in_flight: false,
                skipped: 0,
                close_reason: None,
                stats: SubscriberStats::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Offer a chunk, keeping at most one waiting
    pub(crate) fn offer(&self, chunk: &Bytes, max_skipped: u32) -> Offer {
        let outcome = {
            let mut state = self.state.lock();
            if !state.phase.is_open() {
                return Offer::Closed;
            }

            if state.pending.is_some() || state.in_flight {
                state.skipped += 1;
                state.stats.frames_skipped += 1;
                if state.skipped >= max_skipped {
                    return Offer::Lagging;
                }
                state.pending = Some(chunk.clone());
                Offer::Replaced
            } else {
                state.skipped = 0;
                state.pending = Some(chunk.clone());
                Offer::Queued
            }
        };

        self.notify.notify_one();
        outcome
    }

    /// Release the slot and mark the subscriber removed
    ///
    /// Returns false if it was already removed.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        {
            let mut state = self.state.lock();
            if state.phase == SubscriberPhase::Removed {
                return false;
            }
            state.transition(reason.closing_phase());
            state.pending = None;
            state.close_reason = Some(reason);
            state.transition(SubscriberPhase::Removed);
        }

        self.notify.notify_one();
        true
    }

    pub(crate) fn phase(&self) -> SubscriberPhase {
        self.state.lock().phase
    }

    pub(crate) fn stats(&self) -> SubscriberStats {
        self.state.lock().stats.clone()
    }

    fn close_reason(&self) -> Option<CloseReason> {
        self.state.lock().close_reason
    }
}

/// A viewer's handle on the hub
///
/// Chunks are pulled with `recv`. Calling `recv` again signals that the
/// previous chunk has been written. Dropping the subscription unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    mailbox: Arc<Mailbox>,
    hub: Arc<StreamHub>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, mailbox: Arc<Mailbox>, hub: Arc<StreamHub>) -> Self {
        Self { id, mailbox, hub }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next chunk
    ///
    /// Returns `None` once the subscriber has been removed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            let notified = self.mailbox.notify.notified();
            {
                let mut state = self.mailbox.state.lock();
                state.in_flight = false;

                match state.phase {
                    SubscriberPhase::Connecting => state.transition(SubscriberPhase::Active),
                    SubscriberPhase::Active => {}
                    _ => return None,
                }

                if let Some(chunk) = state.pending.take() {
                    state.in_flight = true;
                    state.skipped = 0;
                    state.stats.chunks_delivered += 1;
                    state.stats.bytes_delivered += chunk.len() as u64;
                    return Some(chunk);
                }
            }
            notified.await;
        }
    }

    /// Report that writing a chunk failed; removes the subscriber
    pub fn write_failed(&self) {
        self.hub.close_subscriber(self.id, CloseReason::WriteFailed);
    }

    pub fn phase(&self) -> SubscriberPhase {
        self.mailbox.phase()
    }

    /// Why the subscriber was removed, if it was
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.mailbox.close_reason()
    }

    pub fn stats(&self) -> SubscriberStats {
        self.mailbox.stats()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        use SubscriberPhase::*;

        assert!(Connecting.can_transition_to(Active));
        assert!(Active.can_transition_to(Draining));
        assert!(Active.can_transition_to(Dropped));
        assert!(Draining.can_transition_to(Removed));
        assert!(Dropped.can_transition_to(Removed));

        assert!(!Active.can_transition_to(Connecting));
        assert!(!Removed.can_transition_to(Active));
        assert!(!Draining.can_transition_to(Active));
        assert!(!Active.can_transition_to(Removed));
    }

    #[test]
    fn test_offer_replaces_waiting_chunk() {
        let mailbox = Mailbox::new();

        assert_eq!(mailbox.offer(&Bytes::from_static(b"1"), 5), Offer::Queued);
        assert_eq!(mailbox.offer(&Bytes::from_static(b"2"), 5), Offer::Replaced);

        let state = mailbox.state.lock();
        assert_eq!(state.pending.as_deref(), Some(&b"2"[..]));
        assert_eq!(state.skipped, 1);
        assert_eq!(state.stats.frames_skipped, 1);
    }

    #[test]
    fn test_offer_lagging_at_threshold() {
        let mailbox = Mailbox::new();
        let chunk = Bytes::from_static(b"x");

        assert_eq!(mailbox.offer(&chunk, 3), Offer::Queued);
        assert_eq!(mailbox.offer(&chunk, 3), Offer::Replaced);
        assert_eq!(mailbox.offer(&chunk, 3), Offer::Replaced);
        assert_eq!(mailbox.offer(&chunk, 3), Offer::Lagging);
    }

    #[test]
    fn test_offer_after_close() {
        let mailbox = Mailbox::new();
        mailbox.offer(&Bytes::from_static(b"x"), 5);

        assert!(mailbox.close(CloseReason::Lagging));
        assert!(!mailbox.close(CloseReason::Unsubscribed));

        assert_eq!(mailbox.phase(), SubscriberPhase::Removed);
        assert_eq!(mailbox.close_reason(), Some(CloseReason::Lagging));
        assert!(mailbox.state.lock().pending.is_none());
        assert_eq!(mailbox.offer(&Bytes::from_static(b"y"), 5), Offer::Closed);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(SubscriberId(7).to_string(), "sub-7");
        assert_eq!(CloseReason::WriteFailed.to_string(), "write failed");
    }
}
