//! Delivery confirmation tracking
//!
//! Senders of emergencies and alerts need to know their message reached
//! somebody. The [`DeliveryTracker`] remembers which outbound messages
//! are awaiting a confirmation, matches incoming acks against them, and
//! broadcasts [`DeliveryEvent`]s for the console and HTTP surfaces.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use lantern_core::{MessageId, MessageKind, StationId};

/// An outbound message awaiting confirmation
#[derive(Debug, Clone)]
pub struct PendingDelivery {
    /// Id of the tracked message
    pub id: MessageId,
    /// What the message carries
    pub kind: MessageKind,
    /// When tracking started
    pub tracked_at: Instant,
    /// How long to wait before declaring the delivery unconfirmed
    pub deadline: Duration,
}

impl PendingDelivery {
    /// Whether the confirmation window has closed
    pub fn is_overdue(&self) -> bool {
        self.tracked_at.elapsed() > self.deadline
    }
}

/// Outcome notifications for tracked messages
#[derive(Debug, Clone)]
pub enum DeliveryEvent {
    /// A peer confirmed receipt
    Delivered {
        /// Id of the confirmed message
        id: MessageId,
        /// Station that sent the confirmation
        by: StationId,
        /// Time from tracking to confirmation
        waited: Duration,
    },
    /// The confirmation window closed without an ack
    Unconfirmed {
        /// Id of the unconfirmed message
        id: MessageId,
    },
    /// The message expired in the forwarding queue before leaving
    Expired {
        /// Id of the expired message
        id: MessageId,
    },
    /// Forwarding gave up after exhausting its attempt budget
    Failed {
        /// Id of the failed message
        id: MessageId,
        /// Attempts made before giving up
        attempts: u32,
    },
}

/// Tracks outbound messages until a peer confirms receipt
///
/// Only the first confirmation for a message counts; later acks for the
/// same id are ignored. Call [`DeliveryTracker::check_overdue`]
/// periodically to time out entries whose window has closed.
pub struct DeliveryTracker {
    pending: DashMap<MessageId, PendingDelivery>,
    event_tx: broadcast::Sender<DeliveryEvent>,
    ack_deadline: Duration,
    total_confirmed: AtomicU64,
}

impl DeliveryTracker {
    /// Create a tracker with the given confirmation window
    pub fn new(ack_deadline: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            pending: DashMap::new(),
            event_tx,
            ack_deadline,
            total_confirmed: AtomicU64::new(0),
        }
    }

    /// Start waiting for a confirmation of `id`
    pub fn track(&self, id: MessageId, kind: MessageKind) {
        self.pending.insert(
            id,
            PendingDelivery {
                id,
                kind,
                tracked_at: Instant::now(),
                deadline: self.ack_deadline,
            },
        );
    }

    /// Handle an incoming confirmation
    ///
    /// Returns true if this was the first ack for a tracked message.
    pub fn confirm(&self, id: MessageId, by: StationId) -> bool {
        let Some((_, pending)) = self.pending.remove(&id) else {
            debug!(%id, "ack for unknown or already confirmed message");
            return false;
        };

        self.total_confirmed.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_tx.send(DeliveryEvent::Delivered {
            id,
            by,
            waited: pending.tracked_at.elapsed(),
        });
        true
    }

    /// Time out entries whose confirmation window has closed
    ///
    /// Emits an [`DeliveryEvent::Unconfirmed`] for each and returns their ids.
    pub fn check_overdue(&self) -> Vec<MessageId> {
        let overdue: Vec<MessageId> = self
            .pending
            .iter()
            .filter(|p| p.is_overdue())
            .map(|p| p.id)
            .collect();

        for id in &overdue {
            if self.pending.remove(id).is_some() {
                let _ = self.event_tx.send(DeliveryEvent::Unconfirmed { id: *id });
            }
        }

        overdue
    }

    /// Record that a tracked message expired in the forwarding queue
    pub fn note_expired(&self, id: MessageId) {
        self.pending.remove(&id);
        let _ = self.event_tx.send(DeliveryEvent::Expired { id });
    }

    /// Record that forwarding gave up on a tracked message
    pub fn note_failed(&self, id: MessageId, attempts: u32) {
        self.pending.remove(&id);
        let _ = self.event_tx.send(DeliveryEvent::Failed { id, attempts });
    }

    /// Subscribe to delivery outcome notifications
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.event_tx.subscribe()
    }

    /// Whether a message is still awaiting confirmation
    pub fn is_pending(&self, id: &MessageId) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of messages awaiting confirmation
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Confirmations received since startup
    pub fn total_confirmed(&self) -> u64 {
        self.total_confirmed.load(Ordering::Relaxed)
    }
}
