//! Gossip-room transport for Lantern
//!
//! This crate wraps iroh and iroh-gossip into room-oriented handles. A
//! room is a named rendezvous: its gossip topic is derived from the name
//! alone, so any station that knows the name (and can reach one member)
//! lands in the same swarm.
//!
//! # Features
//!
//! - **Rooms**: named topics with split sender/receiver handles
//! - **Signed frames**: every outbound frame is signed; bad signatures
//!   are dropped on receive
//! - **Legacy interop**: inbound JSON and plain-text frames from older
//!   stations are still decoded
//! - **Presence**: periodic beacons, a roster of known stations, and
//!   timeout-based departure detection
//! - **Tickets**: shareable `lantern:room:...` strings carrying the room
//!   name and bootstrap addresses
//!
//! # Example
//!
//! ```rust,ignore
//! use lantern_mesh::{MeshConfig, MeshNode, RoomTicket};
//!
//! // Spawn a node with a fresh identity
//! let node = MeshNode::spawn(MeshConfig::new()).await?;
//!
//! // Start a room alone and print a ticket for others
//! let mut room = node.join_room("commons", &[]).await?;
//! println!("join with: {}", node.ticket_for("commons"));
//!
//! // Or join through a ticket
//! let ticket: RoomTicket = "lantern:room:...".parse()?;
//! let mut room = node.join_room(&ticket.room, &ticket.bootstrap).await?;
//!
//! // Send and receive
//! room.sender.broadcast_chat(&message).await?;
//! while let Some(event) = room.receiver.recv().await {
//!     // handle MeshEvent
//! }
//! ```

pub mod error;
pub mod events;
pub mod node;
pub mod presence;
pub mod room;
pub mod ticket;
pub mod wire;

pub use error::{MeshError, MeshResult};
pub use events::MeshEvent;
pub use node::{MeshConfig, MeshNode};
pub use presence::{
    KnownStation, PeerEvent, PresenceBeacon, PresenceBook, DEFAULT_ANNOUNCE_INTERVAL,
    DEFAULT_PEER_TIMEOUT,
};
pub use room::{presence_topic_id, room_topic_id, RoomHandle, RoomReceiver, SplitRoom};
pub use ticket::RoomTicket;
pub use wire::{ReceivedFrame, SignedEnvelope, WirePayload};
