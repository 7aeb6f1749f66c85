//! Priority queue for parcels awaiting forwarding
//!
//! When the mesh is unreachable, outbound messages wait here until a
//! peer connection comes back. The queue drains highest priority first
//! and FIFO within a priority class. Under memory pressure it sheds the
//! oldest parcel of the lowest present class, but never an emergency.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, instrument, warn};

use lantern_core::MessageId;

use crate::error::{CourierError, CourierResult};
use crate::parcel::{Parcel, Priority};

/// Store-and-forward queue ordered by priority, then age
///
/// Keys are `(priority rank, insertion sequence)` so iteration yields
/// critical parcels first and, within a class, the longest-waiting one.
pub struct CourierQueue {
    inner: Mutex<QueueInner>,
    max_queued: usize,
    total_enqueued: AtomicU64,
    total_shed: AtomicU64,
    total_expired: AtomicU64,
}

struct QueueInner {
    parcels: BTreeMap<(u8, u64), Parcel>,
    ids: HashSet<MessageId>,
    next_seq: u64,
}

/// Snapshot of queue occupancy and lifetime counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Parcels currently waiting
    pub queued: usize,
    /// Waiting parcels at critical priority
    pub critical: usize,
    /// Waiting parcels at high priority
    pub high: usize,
    /// Waiting parcels at normal priority
    pub normal: usize,
    /// Waiting parcels at low priority
    pub low: usize,
    /// Parcels accepted since startup
    pub total_enqueued: u64,
    /// Parcels shed to make room since startup
    pub total_shed: u64,
    /// Parcels dropped as expired since startup
    pub total_expired: u64,
}

impl CourierQueue {
    /// Create a queue holding at most `max_queued` parcels
    pub fn new(max_queued: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                parcels: BTreeMap::new(),
                ids: HashSet::new(),
                next_seq: 0,
            }),
            max_queued,
            total_enqueued: AtomicU64::new(0),
            total_shed: AtomicU64::new(0),
            total_expired: AtomicU64::new(0),
        }
    }

    /// Queue a parcel for forwarding
    ///
    /// Returns the parcel that was shed to make room, if any. Rejects
    /// duplicates, and rejects outright when the queue is full of
    /// critical traffic that may not be dropped.
    #[instrument(skip(self, parcel), fields(id = %parcel.id(), priority = ?parcel.priority))]
    pub fn enqueue(&self, parcel: Parcel) -> CourierResult<Option<Parcel>> {
        let mut inner = self.lock()?;

        if inner.ids.contains(&parcel.id()) {
            return Err(CourierError::Duplicate(parcel.id()));
        }

        let shed = if inner.parcels.len() >= self.max_queued {
            let victim = Self::shed_one(&mut inner)?;
            warn!(shed = %victim.id(), "queue full, shedding oldest low-priority parcel");
            self.total_shed.fetch_add(1, Ordering::Relaxed);
            Some(victim)
        } else {
            None
        };

        Self::insert(&mut inner, parcel);
        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(shed)
    }

    /// Put a parcel back after a failed forwarding attempt
    ///
    /// The parcel keeps its priority but rejoins the back of its class.
    pub fn requeue(&self, parcel: Parcel) -> CourierResult<Option<Parcel>> {
        let mut inner = self.lock()?;

        if inner.ids.contains(&parcel.id()) {
            return Err(CourierError::Duplicate(parcel.id()));
        }

        let shed = if inner.parcels.len() >= self.max_queued {
            let victim = Self::shed_one(&mut inner)?;
            self.total_shed.fetch_add(1, Ordering::Relaxed);
            Some(victim)
        } else {
            None
        };

        Self::insert(&mut inner, parcel);
        Ok(shed)
    }

    /// Take up to `max` unexpired parcels in forwarding order
    ///
    /// Expired parcels encountered on the way are dropped and counted,
    /// not returned. Callers re-queue parcels whose forwarding fails.
    pub fn drain_ready(&self, max: usize) -> CourierResult<Vec<Parcel>> {
        let mut inner = self.lock()?;
        let mut ready = Vec::new();

        while ready.len() < max {
            let Some((&key, _)) = inner.parcels.iter().next() else {
                break;
            };
            let Some(parcel) = inner.parcels.remove(&key) else {
                break;
            };
            inner.ids.remove(&parcel.id());

            if parcel.is_expired() {
                debug!(id = %parcel.id(), "dropping expired parcel during drain");
                self.total_expired.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            ready.push(parcel);
        }

        Ok(ready)
    }

    /// Remove and return every expired parcel
    pub fn expire_due(&self) -> CourierResult<Vec<Parcel>> {
        let mut inner = self.lock()?;

        let due: Vec<(u8, u64)> = inner
            .parcels
            .iter()
            .filter(|(_, p)| p.is_expired())
            .map(|(&k, _)| k)
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for key in due {
            if let Some(parcel) = inner.parcels.remove(&key) {
                inner.ids.remove(&parcel.id());
                expired.push(parcel);
            }
        }

        self.total_expired
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        Ok(expired)
    }

    /// Whether a message is already waiting in the queue
    pub fn contains(&self, id: &MessageId) -> CourierResult<bool> {
        Ok(self.lock()?.ids.contains(id))
    }

    /// Number of parcels currently waiting
    pub fn len(&self) -> CourierResult<usize> {
        Ok(self.lock()?.parcels.len())
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> CourierResult<bool> {
        Ok(self.lock()?.parcels.is_empty())
    }

    /// Slots left before shedding starts
    pub fn remaining_capacity(&self) -> CourierResult<usize> {
        Ok(self.max_queued.saturating_sub(self.lock()?.parcels.len()))
    }

    /// Snapshot occupancy by priority class plus lifetime counters
    pub fn stats(&self) -> CourierResult<QueueStats> {
        let inner = self.lock()?;

        let mut stats = QueueStats {
            queued: inner.parcels.len(),
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_shed: self.total_shed.load(Ordering::Relaxed),
            total_expired: self.total_expired.load(Ordering::Relaxed),
            ..Default::default()
        };

        for parcel in inner.parcels.values() {
            match parcel.priority {
                Priority::Critical => stats.critical += 1,
                Priority::High => stats.high += 1,
                Priority::Normal => stats.normal += 1,
                Priority::Low => stats.low += 1,
            }
        }

        Ok(stats)
    }

    fn lock(&self) -> CourierResult<std::sync::MutexGuard<'_, QueueInner>> {
        self.inner
            .lock()
            .map_err(|e| CourierError::Lock(e.to_string()))
    }

    fn insert(inner: &mut QueueInner, parcel: Parcel) {
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.ids.insert(parcel.id());
        inner.parcels.insert((parcel.priority.rank(), seq), parcel);
    }

    /// Remove the oldest parcel of the lowest-priority class present
    ///
    /// Critical parcels are exempt; a queue full of them refuses new work.
    fn shed_one(inner: &mut QueueInner) -> CourierResult<Parcel> {
        let lowest_rank = inner
            .parcels
            .keys()
            .map(|&(rank, _)| rank)
            .max()
            .ok_or(CourierError::QueueFull)?;

        if lowest_rank == Priority::Critical.rank() {
            return Err(CourierError::QueueFull);
        }

        let key = inner
            .parcels
            .range((lowest_rank, 0)..)
            .next()
            .map(|(&k, _)| k)
            .ok_or(CourierError::QueueFull)?;

        let parcel = inner.parcels.remove(&key).ok_or(CourierError::QueueFull)?;
        inner.ids.remove(&parcel.id());
        Ok(parcel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lantern_core::{ChatMessage, MessageKind, Role};

    fn make_parcel(seq: u64, kind: MessageKind) -> Parcel {
        let message =
            ChatMessage::new(MessageId::new(0xAB, seq), "queued", Role::Civilian, kind).unwrap();
        Parcel::new(message, Duration::hours(1))
    }

    #[test]
    fn test_enqueue_and_drain_priority_order() {
        let queue = CourierQueue::new(16);

        queue.enqueue(make_parcel(1, MessageKind::Status)).unwrap();
        queue.enqueue(make_parcel(2, MessageKind::Text)).unwrap();
        queue
            .enqueue(make_parcel(3, MessageKind::Emergency))
            .unwrap();
        queue.enqueue(make_parcel(4, MessageKind::Alert)).unwrap();

        let drained = queue.drain_ready(10).unwrap();
        let kinds: Vec<MessageKind> = drained.iter().map(|p| p.message.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::Emergency,
                MessageKind::Alert,
                MessageKind::Text,
                MessageKind::Status
            ]
        );
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_fifo_within_priority_class() {
        let queue = CourierQueue::new(16);

        queue.enqueue(make_parcel(1, MessageKind::Text)).unwrap();
        queue.enqueue(make_parcel(2, MessageKind::Text)).unwrap();
        queue.enqueue(make_parcel(3, MessageKind::Text)).unwrap();

        let drained = queue.drain_ready(10).unwrap();
        let seqs: Vec<u64> = drained.iter().map(|p| p.id().sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let queue = CourierQueue::new(16);
        queue.enqueue(make_parcel(1, MessageKind::Text)).unwrap();

        let result = queue.enqueue(make_parcel(1, MessageKind::Text));
        assert!(matches!(result, Err(CourierError::Duplicate(_))));
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_full_queue_sheds_lowest_priority() {
        let queue = CourierQueue::new(2);
        queue.enqueue(make_parcel(1, MessageKind::Status)).unwrap();
        queue.enqueue(make_parcel(2, MessageKind::Text)).unwrap();

        let shed = queue
            .enqueue(make_parcel(3, MessageKind::Emergency))
            .unwrap();
        let shed = shed.expect("a parcel should have been shed");
        assert_eq!(shed.message.kind, MessageKind::Status);

        let stats = queue.stats().unwrap();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.total_shed, 1);
        assert_eq!(stats.critical, 1);
    }

    #[test]
    fn test_full_queue_of_emergencies_refuses() {
        let queue = CourierQueue::new(2);
        queue
            .enqueue(make_parcel(1, MessageKind::Emergency))
            .unwrap();
        queue
            .enqueue(make_parcel(2, MessageKind::Emergency))
            .unwrap();

        let result = queue.enqueue(make_parcel(3, MessageKind::Emergency));
        assert!(matches!(result, Err(CourierError::QueueFull)));
        assert_eq!(queue.len().unwrap(), 2);
    }

    #[test]
    fn test_drain_skips_expired() {
        let queue = CourierQueue::new(16);

        let fresh = make_parcel(1, MessageKind::Text);
        let message =
            ChatMessage::new(MessageId::new(0xAB, 2), "stale", Role::Civilian, MessageKind::Text)
                .unwrap();
        let stale = Parcel::new(message, Duration::zero());

        queue.enqueue(fresh).unwrap();
        queue.enqueue(stale).unwrap();

        let drained = queue.drain_ready(10).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id().sequence, 1);
        assert_eq!(queue.stats().unwrap().total_expired, 1);
    }

    #[test]
    fn test_expire_due() {
        let queue = CourierQueue::new(16);

        let message =
            ChatMessage::new(MessageId::new(0xAB, 1), "stale", Role::Civilian, MessageKind::Text)
                .unwrap();
        queue.enqueue(Parcel::new(message, Duration::zero())).unwrap();
        queue.enqueue(make_parcel(2, MessageKind::Text)).unwrap();

        let expired = queue.expire_due().unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id().sequence, 1);
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_requeue_goes_to_back_of_class() {
        let queue = CourierQueue::new(16);
        queue.enqueue(make_parcel(1, MessageKind::Text)).unwrap();
        queue.enqueue(make_parcel(2, MessageKind::Text)).unwrap();

        let mut drained = queue.drain_ready(1).unwrap();
        let mut first = drained.remove(0);
        assert_eq!(first.id().sequence, 1);

        first.record_attempt();
        queue.requeue(first).unwrap();

        let order: Vec<u64> = queue
            .drain_ready(10)
            .unwrap()
            .iter()
            .map(|p| p.id().sequence)
            .collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_remaining_capacity() {
        let queue = CourierQueue::new(4);
        assert_eq!(queue.remaining_capacity().unwrap(), 4);
        queue.enqueue(make_parcel(1, MessageKind::Text)).unwrap();
        assert_eq!(queue.remaining_capacity().unwrap(), 3);
    }
}
