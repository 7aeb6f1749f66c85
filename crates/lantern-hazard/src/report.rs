//! Rescue reports and the report board
//!
//! The board is the station's working memory of structured reports:
//! earthquake observations and rescue-status submissions. Chat traffic
//! never lands here; this is what coordination tooling reads when free-form
//! messages are not enough.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use lantern_core::GeoPoint;

use crate::assess::Earthquake;

/// Condition of the person a rescue report concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VictimStatus {
    Safe,
    Injured,
    Trapped,
    Critical,
    #[serde(other)]
    #[default]
    Unknown,
}

impl VictimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VictimStatus::Safe => "safe",
            VictimStatus::Injured => "injured",
            VictimStatus::Trapped => "trapped",
            VictimStatus::Critical => "critical",
            VictimStatus::Unknown => "unknown",
        }
    }
}

/// A structured rescue-status submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescueReport {
    /// Identifier the reporter uses for the person, when known
    pub victim_id: Option<String>,
    pub status: VictimStatus,
    /// Free-form needs ("water", "insulin", "stretcher")
    pub needs: Vec<String>,
    pub position: GeoPoint,
    pub reported_at: DateTime<Utc>,
}

impl RescueReport {
    /// Create a report timestamped now
    pub fn new(status: VictimStatus, needs: Vec<String>, position: GeoPoint) -> Self {
        Self {
            victim_id: None,
            status,
            needs,
            position,
            reported_at: Utc::now(),
        }
    }

    /// Attach the reporter's identifier for the person
    pub fn with_victim_id(mut self, victim_id: impl Into<String>) -> Self {
        self.victim_id = Some(victim_id.into());
        self
    }
}

/// One entry on the board, used for persistence replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoardRecord {
    Earthquake(Earthquake),
    Rescue(RescueReport),
}

/// Concurrent registry of hazard reports
///
/// Ids are monotone per category; iteration in id order is insertion order.
#[derive(Debug)]
pub struct ReportBoard {
    earthquakes: DashMap<u64, Earthquake>,
    rescues: DashMap<u64, RescueReport>,
    next_earthquake: AtomicU64,
    next_rescue: AtomicU64,
    record_tx: broadcast::Sender<BoardRecord>,
}

impl Default for ReportBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportBoard {
    pub fn new() -> Self {
        let (record_tx, _) = broadcast::channel(256);
        Self {
            earthquakes: DashMap::new(),
            rescues: DashMap::new(),
            next_earthquake: AtomicU64::new(0),
            next_rescue: AtomicU64::new(0),
            record_tx,
        }
    }

    /// Record an earthquake observation, returning its board id
    pub fn record_earthquake(&self, quake: Earthquake) -> u64 {
        let id = self.next_earthquake.fetch_add(1, Ordering::SeqCst);
        info!(magnitude = quake.magnitude, depth_km = quake.depth_km, id, "Earthquake recorded");
        self.earthquakes.insert(id, quake.clone());
        let _ = self.record_tx.send(BoardRecord::Earthquake(quake));
        id
    }

    /// Record a rescue report, returning its board id
    pub fn record_rescue(&self, report: RescueReport) -> u64 {
        let id = self.next_rescue.fetch_add(1, Ordering::SeqCst);
        info!(
            status = report.status.as_str(),
            latitude = report.position.latitude,
            longitude = report.position.longitude,
            id,
            "Rescue report recorded"
        );
        self.rescues.insert(id, report.clone());
        let _ = self.record_tx.send(BoardRecord::Rescue(report));
        id
    }

    /// Subscribe to records as they land, for persistence hooks
    pub fn subscribe(&self) -> broadcast::Receiver<BoardRecord> {
        self.record_tx.subscribe()
    }

    /// Re-apply a persisted record (startup replay); subscribers are not
    /// notified
    pub fn replay(&self, record: BoardRecord) {
        match record {
            BoardRecord::Earthquake(quake) => {
                let id = self.next_earthquake.fetch_add(1, Ordering::SeqCst);
                self.earthquakes.insert(id, quake);
            }
            BoardRecord::Rescue(report) => {
                let id = self.next_rescue.fetch_add(1, Ordering::SeqCst);
                self.rescues.insert(id, report);
            }
        }
    }

    /// Earthquakes in insertion order, optionally only those observed after `since`
    pub fn earthquakes_since(&self, since: Option<DateTime<Utc>>) -> Vec<Earthquake> {
        let mut entries: Vec<(u64, Earthquake)> = self
            .earthquakes
            .iter()
            .filter(|entry| since.is_none_or(|cutoff| entry.value().observed_at > cutoff))
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, quake)| quake).collect()
    }

    /// Rescue reports in insertion order, optionally only those after `since`
    pub fn rescues_since(&self, since: Option<DateTime<Utc>>) -> Vec<RescueReport> {
        let mut entries: Vec<(u64, RescueReport)> = self
            .rescues
            .iter()
            .filter(|entry| since.is_none_or(|cutoff| entry.value().reported_at > cutoff))
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, report)| report).collect()
    }

    pub fn earthquake_count(&self) -> usize {
        self.earthquakes.len()
    }

    pub fn rescue_count(&self) -> usize {
        self.rescues.len()
    }
}
