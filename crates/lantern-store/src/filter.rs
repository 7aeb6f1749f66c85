//! Query criteria for the archive
//!
//! The filter mirrors what the consoles actually ask for: the team view
//! narrows by role, unit, or an individual sender; `since` + `limit` keep
//! 2-second polling cheap. An empty filter is the polling default and
//! returns everything in arrival order.

use chrono::{DateTime, Utc};

use lantern_core::{MessageKind, Role, TeamUnit};

use crate::archive::StoredMessage;

/// Filter criteria for querying the archive
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    /// Filter by sender role
    pub role: Option<Role>,
    /// Filter by responder unit (classified from the sender label)
    pub unit: Option<TeamUnit>,
    /// Filter by exact sender label
    pub sender: Option<String>,
    /// Filter by message kind
    pub kind: Option<MessageKind>,
    /// Only messages archived at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Only messages archived at or before this time
    pub until: Option<DateTime<Utc>>,
    /// Case-insensitive content substring
    pub contains: Option<String>,
    /// Maximum number of messages to return
    pub limit: Option<usize>,
    /// Offset for pagination
    pub offset: usize,
}

impl MessageFilter {
    /// Create an empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by role
    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Filter by responder unit
    pub fn unit(mut self, unit: TeamUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Filter by exact sender label
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Filter by message kind
    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Only messages archived at or after a time
    pub fn since(mut self, time: DateTime<Utc>) -> Self {
        self.since = Some(time);
        self
    }

    /// Only messages archived at or before a time
    pub fn until(mut self, time: DateTime<Utc>) -> Self {
        self.until = Some(time);
        self
    }

    /// Case-insensitive content search
    pub fn contains(mut self, needle: impl Into<String>) -> Self {
        self.contains = Some(needle.into());
        self
    }

    /// Limit the number of results
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set pagination offset
    pub fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    /// Whether a stored message passes this filter
    pub fn matches(&self, stored: &StoredMessage) -> bool {
        if let Some(role) = self.role
            && stored.message.role != role
        {
            return false;
        }
        if let Some(unit) = self.unit
            && stored.unit() != unit
        {
            return false;
        }
        if let Some(ref sender) = self.sender
            && &stored.sender != sender
        {
            return false;
        }
        if let Some(kind) = self.kind
            && stored.message.kind != kind
        {
            return false;
        }
        if let Some(since) = self.since
            && stored.received_at < since
        {
            return false;
        }
        if let Some(until) = self.until
            && stored.received_at > until
        {
            return false;
        }
        if let Some(ref needle) = self.contains
            && !stored
                .message
                .content
                .to_lowercase()
                .contains(&needle.to_lowercase())
        {
            return false;
        }
        true
    }
}
