//! Outbound sequence numbers
//!
//! The archive evicts its oldest entries at capacity, so the highest
//! sequence still visible there is not a safe restart floor for a chatty
//! station. The counter reserves numbers in blocks and persists the
//! reservation ceiling before handing any of them out; a restart resumes
//! at the last ceiling, past everything ever minted.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing::warn;

/// Sequence numbers reserved per write of the counter file
const RESERVATION_BLOCK: u64 = 1024;

/// Filename for the persisted reservation ceiling
const COUNTER_FILENAME: &str = "sequence";

/// Hands out strictly increasing sequence numbers across restarts
pub struct SequenceCounter {
    inner: Mutex<Inner>,
}

struct Inner {
    next: u64,
    reserved: u64,
    path: Option<PathBuf>,
}

impl SequenceCounter {
    /// In-memory counter for ephemeral stations
    ///
    /// An ephemeral run gets a fresh identity, so its ids cannot collide
    /// with any earlier run's.
    pub fn ephemeral() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next: 0,
                reserved: u64::MAX,
                path: None,
            }),
        }
    }

    /// Open (or create) the persisted counter under the data directory
    ///
    /// `floor` is the lowest safe sequence derived from the archive; it
    /// covers data directories that predate the counter file.
    pub fn open(data_dir: &Path, floor: u64) -> anyhow::Result<Self> {
        let path = data_dir.join(COUNTER_FILENAME);
        let start = match std::fs::read_to_string(&path) {
            Ok(text) => text
                .trim()
                .parse::<u64>()
                .with_context(|| format!("corrupt sequence file {}", path.display()))?
                .max(floor),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => floor,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read sequence file {}", path.display()));
            }
        };

        let reserved = start.saturating_add(RESERVATION_BLOCK);
        persist(&path, reserved)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                next: start,
                reserved,
                path: Some(path),
            }),
        })
    }

    /// Take the next sequence number
    ///
    /// Minting never fails; when extending the reservation does, the
    /// counter keeps going and retries on the next take.
    pub fn next(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let value = inner.next;
        inner.next += 1;
        if inner.next >= inner.reserved
            && let Some(path) = inner.path.clone()
        {
            let reserved = inner.next.saturating_add(RESERVATION_BLOCK);
            match persist(&path, reserved) {
                Ok(()) => inner.reserved = reserved,
                Err(e) => warn!(error = %e, "Failed to extend the sequence reservation"),
            }
        }
        value
    }
}

fn persist(path: &Path, reserved: u64) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, reserved.to_string())
        .with_context(|| format!("failed to write sequence file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_counts_from_zero() {
        let counter = SequenceCounter::ephemeral();
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn test_floor_applies_to_fresh_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let counter = SequenceCounter::open(dir.path(), 5000).unwrap();
        assert_eq!(counter.next(), 5000);
    }

    #[test]
    fn test_restart_never_reuses_a_minted_id() {
        let dir = tempfile::tempdir().unwrap();

        let mut minted = Vec::new();
        {
            let counter = SequenceCounter::open(dir.path(), 0).unwrap();
            for _ in 0..3 {
                minted.push(counter.next());
            }
        }

        // A floor of zero mimics the archive having evicted every local
        // message; the persisted reservation must still win.
        let counter = SequenceCounter::open(dir.path(), 0).unwrap();
        let resumed = counter.next();
        assert!(resumed > *minted.last().unwrap());
    }

    #[test]
    fn test_reservation_extends_past_the_block() {
        let dir = tempfile::tempdir().unwrap();
        let counter = SequenceCounter::open(dir.path(), 0).unwrap();
        let mut last = 0;
        for _ in 0..(RESERVATION_BLOCK + 10) {
            last = counter.next();
        }

        let counter = SequenceCounter::open(dir.path(), 0).unwrap();
        assert!(counter.next() > last);
    }

    #[test]
    fn test_larger_floor_beats_stale_counter_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(COUNTER_FILENAME), "10").unwrap();

        let counter = SequenceCounter::open(dir.path(), 900).unwrap();
        assert_eq!(counter.next(), 900);
    }

    #[test]
    fn test_corrupt_counter_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(COUNTER_FILENAME), "not a number").unwrap();

        assert!(SequenceCounter::open(dir.path(), 0).is_err());
    }
}
