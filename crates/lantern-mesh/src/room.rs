//! Per-room handle for sending and receiving frames

use std::sync::Arc;

use iroh::SecretKey;
use iroh_gossip::api::{GossipReceiver, GossipSender};
use n0_future::StreamExt;
use tokio::sync::Mutex as TokioMutex;

use lantern_core::{ChatMessage, MessageId};

use crate::error::{MeshError, MeshResult};
use crate::events::MeshEvent;
use crate::presence::PresenceBeacon;
use crate::wire::{self, WirePayload};

/// Derive the gossip topic id for a room's chat traffic
///
/// The id is a hash over a versioned domain prefix and the room name, so
/// every station that knows the name lands on the same topic.
pub fn room_topic_id(room: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"lantern/room/v0/");
    hasher.update(room.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Derive the gossip topic id for a room's presence traffic
pub fn presence_topic_id(room: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"lantern/presence/v0/");
    hasher.update(room.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Handle for broadcasting into a single room topic
#[derive(Clone)]
pub struct RoomHandle {
    /// Room name this handle belongs to
    room: String,
    /// Topic id derived from the room name
    topic_id: [u8; 32],
    /// Sender half of the gossip topic
    sender: Arc<TokioMutex<GossipSender>>,
    /// Secret key for signing frames
    secret_key: SecretKey,
}

impl RoomHandle {
    /// Create a new room handle
    pub(crate) fn new(
        room: String,
        topic_id: [u8; 32],
        sender: GossipSender,
        secret_key: SecretKey,
    ) -> Self {
        Self {
            room,
            topic_id,
            sender: Arc::new(TokioMutex::new(sender)),
            secret_key,
        }
    }

    /// Get the room name
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Get the topic id
    pub fn topic_id(&self) -> [u8; 32] {
        self.topic_id
    }

    /// Sign and broadcast a payload to all room subscribers
    pub async fn broadcast(&self, payload: &WirePayload) -> MeshResult<()> {
        let signed = wire::sign_and_encode(&self.secret_key, payload)?;

        self.sender
            .lock()
            .await
            .broadcast(signed.into())
            .await
            .map_err(|e| MeshError::Broadcast(e.to_string()))
    }

    /// Broadcast a chat message
    pub async fn broadcast_chat(&self, message: &ChatMessage) -> MeshResult<()> {
        self.broadcast(&WirePayload::Chat(message.clone())).await
    }

    /// Broadcast a delivery confirmation for a received message
    pub async fn broadcast_ack(&self, id: MessageId) -> MeshResult<()> {
        self.broadcast(&WirePayload::Ack { id }).await
    }

    /// Broadcast a presence beacon
    pub async fn broadcast_presence(&self, beacon: &PresenceBeacon) -> MeshResult<()> {
        self.broadcast(&WirePayload::Presence(beacon.clone())).await
    }
}

/// Receiver for events from a room topic
pub struct RoomReceiver {
    /// Receiver half of the gossip topic
    receiver: GossipReceiver,
    /// Track if we've joined the swarm
    was_joined: bool,
}

impl RoomReceiver {
    /// Create a new room receiver
    pub(crate) fn new(receiver: GossipReceiver) -> Self {
        Self {
            receiver,
            was_joined: false,
        }
    }

    /// Receive the next event from the room
    ///
    /// Returns `None` when the topic is closed. Frames that fail to decode
    /// or carry a bad signature are logged and skipped, never surfaced.
    pub async fn recv(&mut self) -> Option<MeshResult<MeshEvent>> {
        loop {
            let was_joined = self.was_joined;
            let is_joined = self.receiver.is_joined();

            // Update our joined state
            if !was_joined && is_joined {
                self.was_joined = true;
            }

            match self.receiver.try_next().await {
                Ok(Some(event)) => {
                    match MeshEvent::from_gossip_event(event, was_joined, is_joined) {
                        Ok(converted) => return Some(Ok(converted)),
                        Err(MeshError::SignatureRejected(reason)) => {
                            tracing::warn!(%reason, "Rejected frame with invalid signature");
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!("Failed to process room frame: {}", e);
                            continue;
                        }
                    }
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(MeshError::Other(e.to_string()))),
            }
        }
    }

    /// Check if we've joined the gossip swarm
    pub fn is_joined(&self) -> bool {
        self.receiver.is_joined()
    }
}

/// A joined room with separate sender and receiver halves
pub struct SplitRoom {
    /// Handle for broadcasting frames
    pub sender: RoomHandle,
    /// Receiver for incoming events
    pub receiver: RoomReceiver,
}
