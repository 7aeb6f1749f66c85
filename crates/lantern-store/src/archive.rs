//! The message archive
//!
//! Arrival order is the contract: the polling endpoint returns archive
//! contents as-is, and two polls observe a prefix relation. Everything is
//! keyed by a monotone archive sequence, with a message-id index for
//! duplicate suppression.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lantern_core::{ChatMessage, MessageId, Role, StationId, TeamUnit};

use crate::error::{StoreError, StoreResult};
use crate::filter::MessageFilter;
use crate::log::JsonlLog;

/// A message as the archive keeps it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message: ChatMessage,
    /// Display label resolved at archive time
    pub sender: String,
    /// Originating station, when the message arrived over the mesh
    pub origin: Option<StationId>,
    /// When this station archived the message
    pub received_at: DateTime<Utc>,
    /// Whether this station created the message
    pub local: bool,
}

impl StoredMessage {
    /// Archive entry for a message this station created
    pub fn local(message: ChatMessage) -> Self {
        let sender = message.sender_label();
        Self {
            message,
            sender,
            origin: None,
            received_at: Utc::now(),
            local: true,
        }
    }

    /// Archive entry for a message received over the mesh
    ///
    /// Untyped traffic without a nickname is labeled with the origin's
    /// short id so readers can still tell senders apart.
    pub fn remote(message: ChatMessage, origin: StationId) -> Self {
        let sender = match (&message.nick, message.role) {
            (Some(nick), _) if !nick.is_empty() => nick.clone(),
            (_, Role::Unknown) => origin.short(),
            (_, role) => role.display_name().to_string(),
        };
        Self {
            message,
            sender,
            origin: Some(origin),
            received_at: Utc::now(),
            local: false,
        }
    }

    /// Responder unit classified from the sender label
    pub fn unit(&self) -> TeamUnit {
        TeamUnit::classify(&self.sender)
    }
}

/// Per-sender traffic summary for the team console's grouping
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SenderDigest {
    pub sender: String,
    pub count: usize,
    pub last_seen: DateTime<Utc>,
    /// Whether the sender was heard from within the digest window
    pub active_recently: bool,
}

/// The station's message archive
///
/// In-memory BTreeMap in arrival order with an optional JSONL log behind
/// it. Log writes happen before memory writes; replay on open rebuilds the
/// map.
#[derive(Debug)]
pub struct MessageArchive {
    /// Messages keyed by archive sequence
    entries: RwLock<BTreeMap<u64, StoredMessage>>,
    /// Message id to archive sequence, for duplicate suppression
    id_index: DashMap<MessageId, u64>,
    next_seq: AtomicU64,
    /// Maximum messages kept in memory (0 = unlimited)
    max_messages: usize,
    log: Option<JsonlLog<StoredMessage>>,
}

/// Default in-memory capacity
pub const DEFAULT_MAX_MESSAGES: usize = 10_000;

impl MessageArchive {
    /// Create an archive with no persistence
    pub fn in_memory(max_messages: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            id_index: DashMap::new(),
            next_seq: AtomicU64::new(0),
            max_messages,
            log: None,
        }
    }

    /// Open a persistent archive, replaying the log at `path`
    pub async fn persistent(path: impl AsRef<Path>, max_messages: usize) -> StoreResult<Self> {
        let log = JsonlLog::open(path).await?;
        let replayed = log.load().await?;

        let archive = Self {
            entries: RwLock::new(BTreeMap::new()),
            id_index: DashMap::new(),
            next_seq: AtomicU64::new(0),
            max_messages,
            log: Some(log),
        };
        let mut skipped = 0usize;
        for stored in replayed {
            // Duplicates can exist in the log after a crashed append
            if archive.insert_memory(stored).is_err() {
                skipped += 1;
            }
        }
        if skipped > 0 {
            debug!(skipped, "Skipped duplicate log entries during replay");
        }
        info!(messages = archive.len(), "Archive loaded");
        Ok(archive)
    }

    /// Archive a message; log first, then memory
    pub async fn append(&self, stored: StoredMessage) -> StoreResult<u64> {
        if self.id_index.contains_key(&stored.message.id) {
            return Err(StoreError::Duplicate(stored.message.id));
        }
        if let Some(log) = &self.log {
            log.append(&stored).await?;
        }
        self.insert_memory(stored)
    }

    fn insert_memory(&self, stored: StoredMessage) -> StoreResult<u64> {
        let id = stored.message.id;
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))?;

        if self.id_index.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }

        if self.max_messages > 0 {
            while entries.len() >= self.max_messages {
                if let Some((_, evicted)) = entries.pop_first() {
                    self.id_index.remove(&evicted.message.id);
                } else {
                    break;
                }
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        entries.insert(seq, stored);
        self.id_index.insert(id, seq);
        Ok(seq)
    }

    /// Whether a message id is already archived
    pub fn contains(&self, id: &MessageId) -> bool {
        self.id_index.contains_key(id)
    }

    /// Get a message by id
    pub fn get(&self, id: &MessageId) -> StoreResult<Option<StoredMessage>> {
        let Some(seq) = self.id_index.get(id).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(entries.get(&seq).cloned())
    }

    /// Query messages in arrival order
    pub fn query(&self, filter: &MessageFilter) -> StoreResult<Vec<StoredMessage>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))?;

        let results = entries
            .values()
            .filter(|stored| filter.matches(stored))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(results)
    }

    /// The latest `count` messages, oldest first
    pub fn latest(&self, count: usize) -> StoreResult<Vec<StoredMessage>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        let mut results: Vec<StoredMessage> =
            entries.values().rev().take(count).cloned().collect();
        results.reverse();
        Ok(results)
    }

    /// Per-sender summary of civilian traffic, in first-seen order
    pub fn sender_digest(&self, window: Duration) -> StoreResult<Vec<SenderDigest>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        let now = Utc::now();

        let mut order: Vec<String> = Vec::new();
        let mut digests: BTreeMap<String, SenderDigest> = BTreeMap::new();

        for stored in entries.values() {
            if stored.message.role != Role::Civilian {
                continue;
            }
            match digests.get_mut(&stored.sender) {
                Some(digest) => {
                    digest.count += 1;
                    if stored.received_at > digest.last_seen {
                        digest.last_seen = stored.received_at;
                    }
                }
                None => {
                    order.push(stored.sender.clone());
                    digests.insert(
                        stored.sender.clone(),
                        SenderDigest {
                            sender: stored.sender.clone(),
                            count: 1,
                            last_seen: stored.received_at,
                            active_recently: false,
                        },
                    );
                }
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|sender| digests.remove(&sender))
            .map(|mut digest| {
                digest.active_recently = now - digest.last_seen < window;
                digest
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush the log
    pub async fn flush(&self) -> StoreResult<()> {
        if let Some(log) = &self.log {
            log.flush().await?;
        }
        Ok(())
    }

    /// Rewrite the log to match current memory state
    pub async fn compact(&self) -> StoreResult<()> {
        let Some(log) = &self.log else {
            return Ok(());
        };
        let snapshot: Vec<StoredMessage> = {
            let entries = self
                .entries
                .read()
                .map_err(|e| StoreError::Lock(e.to_string()))?;
            entries.values().cloned().collect()
        };
        log.compact(&snapshot).await
    }
}
