//! Parcel - wraps a chat message with store-and-forward metadata
//!
//! A [`Parcel`] is the unit held by the courier queue while the mesh is
//! unreachable. It carries the original message plus the bookkeeping
//! needed to decide when to retry, when to give up, and which parcels
//! to shed first under memory pressure.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use lantern_core::{ChatMessage, MessageId, MessageKind};

/// Forwarding priority for queued parcels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    /// Low priority - can be delayed or shed
    Low,
    /// Normal priority (default)
    #[default]
    Normal,
    /// High priority - deliver ASAP
    High,
    /// Critical - never drop
    Critical,
}

impl Priority {
    /// Sort rank for queue ordering; lower rank drains first
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl From<MessageKind> for Priority {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Emergency => Priority::Critical,
            MessageKind::Alert => Priority::High,
            MessageKind::Text | MessageKind::Location => Priority::Normal,
            MessageKind::Status => Priority::Low,
        }
    }
}

/// A queued message with store-and-forward metadata
///
/// The parcel adds what the courier needs on top of the bare message:
/// - Lifetime-based expiration
/// - Forwarding priority derived from the message kind
/// - Attempt accounting for retry limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    /// The message awaiting forwarding
    pub message: ChatMessage,
    /// Forwarding priority
    pub priority: Priority,
    /// When the parcel entered the queue
    pub queued_at: DateTime<Utc>,
    /// Maximum time the parcel may sit queued before it expires
    pub lifetime: Duration,
    /// How many forwarding attempts have been made
    pub attempts: u32,
    /// When the last forwarding attempt was made
    pub last_attempt: Option<DateTime<Utc>>,
}

impl Parcel {
    /// Wrap a message for queueing; priority derives from the kind
    pub fn new(message: ChatMessage, lifetime: Duration) -> Self {
        let priority = Priority::from(message.kind);
        Self {
            message,
            priority,
            queued_at: Utc::now(),
            lifetime,
            attempts: 0,
            last_attempt: None,
        }
    }

    /// Override the derived priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// The id of the wrapped message
    pub fn id(&self) -> MessageId {
        self.message.id
    }

    /// How long the parcel has been queued
    pub fn age(&self) -> Duration {
        Utc::now() - self.queued_at
    }

    /// Check whether the parcel has outlived its lifetime
    pub fn is_expired(&self) -> bool {
        self.age() >= self.lifetime
    }

    /// Time remaining before expiration
    pub fn remaining_lifetime(&self) -> Duration {
        let age = self.age();
        if age >= self.lifetime {
            Duration::zero()
        } else {
            self.lifetime - age
        }
    }

    /// Record a forwarding attempt
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
        self.last_attempt = Some(Utc::now());
    }

    /// Whether the attempt budget is spent
    pub fn attempts_exhausted(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::Role;

    fn make_parcel(kind: MessageKind, lifetime: Duration) -> Parcel {
        let message =
            ChatMessage::new(MessageId::new(0xAB, 1), "test traffic", Role::Civilian, kind)
                .unwrap();
        Parcel::new(message, lifetime)
    }

    #[test]
    fn test_priority_from_kind() {
        assert_eq!(Priority::from(MessageKind::Emergency), Priority::Critical);
        assert_eq!(Priority::from(MessageKind::Alert), Priority::High);
        assert_eq!(Priority::from(MessageKind::Text), Priority::Normal);
        assert_eq!(Priority::from(MessageKind::Location), Priority::Normal);
        assert_eq!(Priority::from(MessageKind::Status), Priority::Low);
    }

    #[test]
    fn test_priority_rank_ordering() {
        assert!(Priority::Critical.rank() < Priority::High.rank());
        assert!(Priority::High.rank() < Priority::Normal.rank());
        assert!(Priority::Normal.rank() < Priority::Low.rank());
    }

    #[test]
    fn test_fresh_parcel_not_expired() {
        let parcel = make_parcel(MessageKind::Text, Duration::hours(1));
        assert!(!parcel.is_expired());
        assert!(parcel.remaining_lifetime() > Duration::minutes(59));
        assert_eq!(parcel.attempts, 0);
        assert!(parcel.last_attempt.is_none());
    }

    #[test]
    fn test_zero_lifetime_expires_immediately() {
        let parcel = make_parcel(MessageKind::Text, Duration::zero());
        assert!(parcel.is_expired());
        assert_eq!(parcel.remaining_lifetime(), Duration::zero());
    }

    #[test]
    fn test_record_attempt() {
        let mut parcel = make_parcel(MessageKind::Emergency, Duration::hours(1));
        assert!(!parcel.attempts_exhausted(2));

        parcel.record_attempt();
        assert_eq!(parcel.attempts, 1);
        assert!(parcel.last_attempt.is_some());
        assert!(!parcel.attempts_exhausted(2));

        parcel.record_attempt();
        assert!(parcel.attempts_exhausted(2));
    }
}
