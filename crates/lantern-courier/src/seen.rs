//! Duplicate suppression for gossip traffic
//!
//! Every message relayed through the mesh can arrive more than once.
//! The [`SeenCache`] remembers recently seen ids so a message is
//! archived and re-forwarded at most once per station.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use lantern_core::MessageId;

/// Record of a seen message
#[derive(Debug, Clone)]
struct SeenRecord {
    /// When the id was first seen
    first_seen: Instant,
    /// How many times it has arrived
    count: u32,
}

/// Remembers recently seen message ids for duplicate detection
///
/// Entries age out after the configured TTL. Call [`SeenCache::purge_expired`]
/// periodically or the map grows without bound.
pub struct SeenCache {
    records: DashMap<MessageId, SeenRecord>,
    ttl: Duration,
}

impl SeenCache {
    /// Create a cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
        }
    }

    /// Record a sighting; returns true only for the first one
    pub fn insert_if_new(&self, id: MessageId) -> bool {
        let mut first = false;
        self.records
            .entry(id)
            .and_modify(|r| r.count += 1)
            .or_insert_with(|| {
                first = true;
                SeenRecord {
                    first_seen: Instant::now(),
                    count: 1,
                }
            });
        first
    }

    /// Whether an id has been seen before
    pub fn contains(&self, id: &MessageId) -> bool {
        self.records.contains_key(id)
    }

    /// How many times an id has arrived
    pub fn sighting_count(&self, id: &MessageId) -> u32 {
        self.records.get(id).map(|r| r.count).unwrap_or(0)
    }

    /// Drop entries older than the TTL; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.records.retain(|_, record| {
            let keep = now.duration_since(record.first_seen) < self.ttl;
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    /// Number of ids currently tracked
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sighting_is_new() {
        let cache = SeenCache::new(Duration::from_secs(60));
        let id = MessageId::new(0xAB, 1);

        assert!(cache.insert_if_new(id));
        assert!(!cache.insert_if_new(id));
        assert!(!cache.insert_if_new(id));
        assert_eq!(cache.sighting_count(&id), 3);
    }

    #[test]
    fn test_distinct_ids_independent() {
        let cache = SeenCache::new(Duration::from_secs(60));

        assert!(cache.insert_if_new(MessageId::new(0xAB, 1)));
        assert!(cache.insert_if_new(MessageId::new(0xAB, 2)));
        assert!(cache.insert_if_new(MessageId::new(0xCD, 1)));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_purge_expired() {
        let cache = SeenCache::new(Duration::from_millis(0));
        cache.insert_if_new(MessageId::new(0xAB, 1));
        cache.insert_if_new(MessageId::new(0xAB, 2));

        let removed = cache.purge_expired();
        assert_eq!(removed, 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_keeps_fresh_entries() {
        let cache = SeenCache::new(Duration::from_secs(3600));
        cache.insert_if_new(MessageId::new(0xAB, 1));

        assert_eq!(cache.purge_expired(), 0);
        assert!(cache.contains(&MessageId::new(0xAB, 1)));
    }
}
