//! Event types and conversion from iroh-gossip events

use chrono::{DateTime, Utc};
use iroh::EndpointId;

use lantern_core::{ChatMessage, MessageId, StationId};

use crate::error::MeshResult;
use crate::presence::PresenceBeacon;
use crate::wire::{self, ReceivedFrame, WirePayload};

/// Events received from a room
#[derive(Debug, Clone)]
pub enum MeshEvent {
    /// A new neighbor joined the gossip swarm
    NeighborUp(StationId),

    /// A neighbor left the gossip swarm
    NeighborDown(StationId),

    /// Successfully joined the room
    Joined {
        /// Neighbors present at join time
        neighbors: Vec<StationId>,
    },

    /// A chat message arrived
    MessageReceived {
        /// Originating station
        from: StationId,
        /// The decoded message
        message: ChatMessage,
        /// When the sender created it
        sent_at: DateTime<Utc>,
        /// Whether the frame carried a verified signature
        verified: bool,
    },

    /// A delivery confirmation arrived
    AckReceived {
        /// Station confirming receipt
        from: StationId,
        /// Id of the confirmed message
        id: MessageId,
    },

    /// A presence beacon arrived
    PresenceReceived {
        /// The announcing station
        from: StationId,
        /// The beacon contents
        beacon: PresenceBeacon,
    },

    /// We fell behind and missed some frames
    Lagged,
}

impl MeshEvent {
    /// Convert from an iroh-gossip event
    pub fn from_gossip_event(
        event: iroh_gossip::api::Event,
        was_joined: bool,
        is_joined: bool,
    ) -> MeshResult<Self> {
        use iroh_gossip::api::Event as GE;

        match event {
            GE::NeighborUp(id) => {
                // If we just joined, emit Joined event instead
                if !was_joined && is_joined {
                    Ok(MeshEvent::Joined {
                        neighbors: vec![to_station(id)],
                    })
                } else {
                    Ok(MeshEvent::NeighborUp(to_station(id)))
                }
            }
            GE::NeighborDown(id) => Ok(MeshEvent::NeighborDown(to_station(id))),
            GE::Received(msg) => Self::from_frame(wire::decode_incoming(&msg.content)?),
            GE::Lagged => Ok(MeshEvent::Lagged),
        }
    }

    fn from_frame(frame: ReceivedFrame) -> MeshResult<Self> {
        let ReceivedFrame {
            from,
            sent_at,
            payload,
            verified,
        } = frame;

        Ok(match payload {
            WirePayload::Chat(message) => MeshEvent::MessageReceived {
                from,
                message,
                sent_at,
                verified,
            },
            WirePayload::Ack { id } => MeshEvent::AckReceived { from, id },
            WirePayload::Presence(beacon) => MeshEvent::PresenceReceived { from, beacon },
        })
    }
}

fn to_station(id: EndpointId) -> StationId {
    StationId::new(*id.as_bytes())
}
