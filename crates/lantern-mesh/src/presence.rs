//! Station presence tracking
//!
//! Every station announces itself on the room's presence topic at a
//! fixed interval. The [`PresenceBook`] collects these beacons into a
//! roster, times out stations that fall silent, and broadcasts
//! [`PeerEvent`]s so consoles can show who is reachable.

use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use lantern_core::{Role, StationId, TeamUnit};

/// How often a station announces itself
pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);

/// How long a silent station stays on the roster
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(90);

/// Minimum gap between introductions to the same peer
const INTRODUCTION_RATE_LIMIT: Duration = Duration::from_secs(30);

/// Liveness announcement broadcast on the presence topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceBeacon {
    /// The station's chosen nickname
    pub nick: Option<String>,
    /// The station's conversation role
    pub role: Role,
    /// Responder unit, for team stations
    pub unit: Option<TeamUnit>,
    /// When the beacon was created, in Unix seconds
    pub sent_at: i64,
}

impl PresenceBeacon {
    /// Create a beacon stamped with the current time
    pub fn new(nick: Option<String>, role: Role, unit: Option<TeamUnit>) -> Self {
        Self {
            nick,
            role,
            unit,
            sent_at: Utc::now().timestamp(),
        }
    }
}

/// A station currently on the roster
#[derive(Debug, Clone)]
pub struct KnownStation {
    /// The station's identity
    pub id: StationId,
    /// Last announced nickname
    pub nick: Option<String>,
    /// Last announced role
    pub role: Role,
    /// Last announced unit
    pub unit: Option<TeamUnit>,
    /// When the station first appeared
    pub first_seen: Instant,
    /// When the last beacon arrived
    pub last_seen: Instant,
}

impl KnownStation {
    /// The label consoles show for this station
    pub fn display_name(&self) -> String {
        match &self.nick {
            Some(nick) if !nick.is_empty() => nick.clone(),
            _ => self.id.short(),
        }
    }
}

/// Roster change notifications
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A station appeared for the first time
    Joined {
        /// The new station
        station: StationId,
        /// Its announced nickname
        nick: Option<String>,
        /// Its announced role
        role: Role,
    },
    /// A known station announced different details
    Updated {
        /// The station that changed
        station: StationId,
    },
    /// A station fell silent past the timeout
    Left {
        /// The departed station
        station: StationId,
    },
}

/// Tracks which stations are reachable on the room
///
/// Call [`PresenceBook::sweep`] periodically so silent stations age off
/// the roster.
pub struct PresenceBook {
    stations: DashMap<StationId, KnownStation>,
    event_tx: broadcast::Sender<PeerEvent>,
    peer_timeout: Duration,
    /// Last introduction per peer, for rate limiting
    introduction_clock: DashMap<StationId, Instant>,
    local: StationId,
}

impl PresenceBook {
    /// Create a book for the local station with the given timeout
    pub fn new(local: StationId, peer_timeout: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            stations: DashMap::new(),
            event_tx,
            peer_timeout,
            introduction_clock: DashMap::new(),
            local,
        }
    }

    /// Record a beacon; returns true if this station is new to the roster
    pub fn observe(&self, station: StationId, beacon: &PresenceBeacon) -> bool {
        if station == self.local {
            return false;
        }

        let now = Instant::now();
        match self.stations.entry(station) {
            dashmap::Entry::Occupied(mut entry) => {
                let known = entry.get_mut();
                let changed = known.nick != beacon.nick
                    || known.role != beacon.role
                    || known.unit != beacon.unit;

                known.nick = beacon.nick.clone();
                known.role = beacon.role;
                known.unit = beacon.unit;
                known.last_seen = now;

                if changed {
                    let _ = self.event_tx.send(PeerEvent::Updated { station });
                }
                false
            }
            dashmap::Entry::Vacant(entry) => {
                entry.insert(KnownStation {
                    id: station,
                    nick: beacon.nick.clone(),
                    role: beacon.role,
                    unit: beacon.unit,
                    first_seen: now,
                    last_seen: now,
                });
                let _ = self.event_tx.send(PeerEvent::Joined {
                    station,
                    nick: beacon.nick.clone(),
                    role: beacon.role,
                });
                true
            }
        }
    }

    /// Drop stations whose last beacon is older than the timeout
    ///
    /// Emits a [`PeerEvent::Left`] for each and returns their ids.
    pub fn sweep(&self) -> Vec<StationId> {
        let now = Instant::now();
        let stale: Vec<StationId> = self
            .stations
            .iter()
            .filter(|s| now.duration_since(s.last_seen) >= self.peer_timeout)
            .map(|s| s.id)
            .collect();

        for id in &stale {
            if self.stations.remove(id).is_some() {
                debug!(station = %id.short(), "station timed out");
                let _ = self.event_tx.send(PeerEvent::Left { station: *id });
            }
        }

        self.introduction_clock
            .retain(|id, _| self.stations.contains_key(id));

        stale
    }

    /// Whether we should send this peer a direct introduction beacon
    ///
    /// Only the station with the lower id introduces itself, so a pair of
    /// stations never greet each other twice at once. Limited to one
    /// introduction per peer per rate window.
    pub fn should_introduce(&self, peer: StationId) -> bool {
        if self.local >= peer {
            return false;
        }

        if let Some(last) = self.introduction_clock.get(&peer)
            && last.elapsed() < INTRODUCTION_RATE_LIMIT
        {
            return false;
        }

        self.introduction_clock.insert(peer, Instant::now());
        true
    }

    /// Snapshot of the roster, oldest arrival first
    pub fn roster(&self) -> Vec<KnownStation> {
        let mut stations: Vec<KnownStation> =
            self.stations.iter().map(|s| s.value().clone()).collect();
        stations.sort_by_key(|s| s.first_seen);
        stations
    }

    /// Look up a station by id
    pub fn get(&self, id: &StationId) -> Option<KnownStation> {
        self.stations.get(id).map(|s| s.value().clone())
    }

    /// Number of stations on the roster
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Whether the roster is empty
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Subscribe to roster change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(byte: u8) -> StationId {
        StationId::new([byte; 32])
    }

    fn beacon(nick: &str, role: Role) -> PresenceBeacon {
        PresenceBeacon::new(Some(nick.to_string()), role, None)
    }

    #[tokio::test]
    async fn test_first_beacon_joins() {
        let book = PresenceBook::new(station(0), DEFAULT_PEER_TIMEOUT);
        let mut events = book.subscribe();

        assert!(book.observe(station(1), &beacon("shelter-7", Role::Civilian)));
        assert_eq!(book.len(), 1);

        match events.recv().await.unwrap() {
            PeerEvent::Joined { station: got, nick, role } => {
                assert_eq!(got, station(1));
                assert_eq!(nick.as_deref(), Some("shelter-7"));
                assert_eq!(role, Role::Civilian);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repeat_beacon_refreshes_quietly() {
        let book = PresenceBook::new(station(0), DEFAULT_PEER_TIMEOUT);
        let b = beacon("shelter-7", Role::Civilian);

        assert!(book.observe(station(1), &b));
        let mut events = book.subscribe();
        assert!(!book.observe(station(1), &b));

        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_changed_details_emit_updated() {
        let book = PresenceBook::new(station(0), DEFAULT_PEER_TIMEOUT);
        book.observe(station(1), &beacon("shelter-7", Role::Civilian));

        let mut events = book.subscribe();
        book.observe(station(1), &beacon("Medical Team 3", Role::Team));

        assert!(matches!(
            events.recv().await.unwrap(),
            PeerEvent::Updated { station: got } if got == station(1)
        ));
        assert_eq!(book.get(&station(1)).unwrap().role, Role::Team);
    }

    #[tokio::test]
    async fn test_own_beacon_ignored() {
        let book = PresenceBook::new(station(0), DEFAULT_PEER_TIMEOUT);
        assert!(!book.observe(station(0), &beacon("self", Role::Civilian)));
        assert!(book.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_times_out_silent_stations() {
        let book = PresenceBook::new(station(0), Duration::from_millis(0));
        book.observe(station(1), &beacon("shelter-7", Role::Civilian));
        let mut events = book.subscribe();

        let stale = book.sweep();
        assert_eq!(stale, vec![station(1)]);
        assert!(book.is_empty());

        assert!(matches!(
            events.recv().await.unwrap(),
            PeerEvent::Left { station: got } if got == station(1)
        ));
    }

    #[test]
    fn test_lower_id_introduces() {
        let low = PresenceBook::new(station(1), DEFAULT_PEER_TIMEOUT);
        let high = PresenceBook::new(station(9), DEFAULT_PEER_TIMEOUT);

        assert!(low.should_introduce(station(9)));
        assert!(!high.should_introduce(station(1)));
    }

    #[test]
    fn test_introduction_rate_limited() {
        let book = PresenceBook::new(station(1), DEFAULT_PEER_TIMEOUT);
        assert!(book.should_introduce(station(9)));
        assert!(!book.should_introduce(station(9)));
        assert!(book.should_introduce(station(5)));
    }

    #[test]
    fn test_display_name_falls_back_to_short_id() {
        let book = PresenceBook::new(station(0), DEFAULT_PEER_TIMEOUT);
        book.observe(station(0xab), &PresenceBeacon::new(None, Role::Unknown, None));

        let known = book.get(&station(0xab)).unwrap();
        assert_eq!(known.display_name(), "abababab");
    }
}
