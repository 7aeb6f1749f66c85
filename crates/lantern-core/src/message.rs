//! The chat message model
//!
//! A [`ChatMessage`] is the unit of traffic on the mesh: a piece of text
//! with a role, an optional nickname, a kind, and a globally unique
//! [`MessageId`] derived from the originating station plus a per-station
//! sequence counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::role::Role;

/// Unique identifier for a message
///
/// The origin hash pins the id to the station that created the message, so
/// two stations can never mint the same id even when their sequence
/// counters collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId {
    /// Hash of the originating station's identity
    pub origin_hash: u64,
    /// Per-station sequence number
    pub sequence: u64,
}

impl MessageId {
    /// Create a new message id
    pub fn new(origin_hash: u64, sequence: u64) -> Self {
        Self {
            origin_hash,
            sequence,
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}#{}", self.origin_hash, self.sequence)
    }
}

/// What a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Ordinary chat text
    #[default]
    Text,
    /// Station status ("station X online")
    Status,
    /// A formatted position report
    Location,
    /// A distress message, delivery-confirmed
    Emergency,
    /// A system-wide alert (for example an earthquake report)
    Alert,
}

/// A single message as it travels through the mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Globally unique id
    pub id: MessageId,
    /// The message text
    pub content: String,
    /// Sender's chosen nickname, when one is set
    pub nick: Option<String>,
    /// Sender's conversation role
    pub role: Role,
    /// What the message carries
    pub kind: MessageKind,
    /// When the sender created the message
    pub sent_at: DateTime<Utc>,
    /// Whether the sender asked for a delivery confirmation
    pub ack_requested: bool,
}

impl ChatMessage {
    /// Create a new message; content must be non-empty
    pub fn new(
        id: MessageId,
        content: impl Into<String>,
        role: Role,
        kind: MessageKind,
    ) -> CoreResult<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(CoreError::EmptyContent);
        }
        Ok(Self {
            id,
            content,
            nick: None,
            role,
            kind,
            sent_at: Utc::now(),
            ack_requested: false,
        })
    }

    /// Attach the sender's nickname
    pub fn with_nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = Some(nick.into());
        self
    }

    /// Explicitly request a delivery confirmation
    pub fn with_ack_requested(mut self, ack: bool) -> Self {
        self.ack_requested = ack;
        self
    }

    /// Override the creation timestamp (used when decoding wire traffic)
    pub fn with_sent_at(mut self, sent_at: DateTime<Utc>) -> Self {
        self.sent_at = sent_at;
        self
    }

    /// Whether receivers should confirm delivery of this message
    ///
    /// Emergencies and alerts are always confirmed; anything else only when
    /// the sender asked.
    pub fn wants_ack(&self) -> bool {
        self.ack_requested || matches!(self.kind, MessageKind::Emergency | MessageKind::Alert)
    }

    /// The label readers see as the sender
    ///
    /// The nickname when one is set, else the role display name.
    pub fn sender_label(&self) -> String {
        match &self.nick {
            Some(nick) if !nick.is_empty() => nick.clone(),
            _ => self.role.display_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> ChatMessage {
        ChatMessage::new(MessageId::new(1, 1), content, Role::Civilian, MessageKind::Text).unwrap()
    }

    #[test]
    fn test_empty_content_rejected() {
        let err = ChatMessage::new(MessageId::new(1, 1), "   ", Role::Civilian, MessageKind::Text);
        assert!(matches!(err, Err(CoreError::EmptyContent)));
    }

    #[test]
    fn test_message_id_display_keeps_full_origin() {
        let id = MessageId::new(0xdead_beef_cafe, 42);
        assert_eq!(format!("{}", id), "0000deadbeefcafe#42");

        // Two origins that agree on the low 32 bits still render apart
        let low = MessageId::new(0x0000_0000_beef_cafe, 42);
        assert_ne!(format!("{}", low), format!("{}", id));
    }

    #[test]
    fn test_message_id_ordering() {
        let a = MessageId::new(1, 1);
        let b = MessageId::new(1, 2);
        let c = MessageId::new(2, 1);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_sender_label_prefers_nick() {
        let plain = msg("help");
        assert_eq!(plain.sender_label(), "Civilian");

        let named = msg("help").with_nick("shelter-7");
        assert_eq!(named.sender_label(), "shelter-7");

        let mut team = msg("on our way");
        team.role = Role::Team;
        assert_eq!(team.sender_label(), "Rescue Team");
    }

    #[test]
    fn test_wants_ack_for_emergencies() {
        let text = msg("hello");
        assert!(!text.wants_ack());

        let mut emergency = msg("trapped under rubble");
        emergency.kind = MessageKind::Emergency;
        assert!(emergency.wants_ack());

        let explicit = msg("hello").with_ack_requested(true);
        assert!(explicit.wants_ack());
    }

    #[test]
    fn test_kind_wire_form() {
        let json = serde_json::to_string(&MessageKind::Emergency).unwrap();
        assert_eq!(json, "\"emergency\"");
    }
}
