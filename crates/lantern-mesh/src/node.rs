//! Mesh node wrapper around the iroh endpoint and gossip instance

use dashmap::DashMap;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointAddr, EndpointId, SecretKey};
use iroh_gossip::net::{Gossip, GOSSIP_ALPN};
use tracing::{debug, info, instrument, warn};

use lantern_core::StationId;

use crate::error::{MeshError, MeshResult};
use crate::room::{presence_topic_id, room_topic_id, RoomHandle, RoomReceiver, SplitRoom};
use crate::ticket::RoomTicket;

/// Configuration for spawning a mesh node
#[derive(Default)]
pub struct MeshConfig {
    /// Secret key for the station identity. A fresh one is generated
    /// when absent, giving the node an ephemeral identity.
    pub secret_key: Option<SecretKey>,
}

impl MeshConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a persistent station identity
    pub fn with_secret_key(mut self, key: SecretKey) -> Self {
        self.secret_key = Some(key);
        self
    }
}

/// Mesh node that manages room subscriptions over gossip
pub struct MeshNode {
    /// The underlying iroh endpoint
    endpoint: Endpoint,
    /// The gossip instance
    gossip: Gossip,
    /// Protocol router keeping the gossip handler alive
    router: Router,
    /// Secret key for signing frames
    secret_key: SecretKey,
    /// Active room subscriptions by topic id
    rooms: DashMap<[u8; 32], RoomHandle>,
}

impl MeshNode {
    /// Bind an endpoint and spawn the gossip protocol handler
    pub async fn spawn(config: MeshConfig) -> MeshResult<Self> {
        let secret_key = config
            .secret_key
            .unwrap_or_else(|| SecretKey::generate(&mut rand::rng()));

        let endpoint = Endpoint::builder()
            .secret_key(secret_key.clone())
            .bind()
            .await
            .map_err(|e| MeshError::Bind(e.to_string()))?;

        let gossip = Gossip::builder().spawn(endpoint.clone());

        let router = Router::builder(endpoint.clone())
            .accept(GOSSIP_ALPN, gossip.clone())
            .spawn();

        let node = Self {
            endpoint,
            gossip,
            router,
            secret_key,
            rooms: DashMap::new(),
        };

        info!(station = %node.station_id().short(), "Mesh node online");
        Ok(node)
    }

    /// Get our station id
    pub fn station_id(&self) -> StationId {
        StationId::new(*self.endpoint.id().as_bytes())
    }

    /// Get our endpoint id
    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint.id()
    }

    /// Get the endpoint address for sharing with peers
    pub fn node_addr(&self) -> EndpointAddr {
        self.endpoint.addr()
    }

    /// Create a ticket others can use to join a room through this station
    pub fn ticket_for(&self, room: &str) -> RoomTicket {
        RoomTicket::new(room, vec![self.node_addr()])
    }

    /// Join a room's chat topic
    ///
    /// With a non-empty bootstrap list this resolves once the first
    /// neighbor appears. With an empty list it resolves immediately,
    /// starting the room alone.
    pub async fn join_room(&self, room: &str, bootstrap: &[EndpointAddr]) -> MeshResult<SplitRoom> {
        self.join_topic(room, room_topic_id(room), bootstrap).await
    }

    /// Join a room's presence topic
    pub async fn join_presence(
        &self,
        room: &str,
        bootstrap: &[EndpointAddr],
    ) -> MeshResult<SplitRoom> {
        self.join_topic(room, presence_topic_id(room), bootstrap)
            .await
    }

    #[instrument(skip(self, topic_id, bootstrap), fields(station = %self.station_id().short()))]
    async fn join_topic(
        &self,
        room: &str,
        topic_id: [u8; 32],
        bootstrap: &[EndpointAddr],
    ) -> MeshResult<SplitRoom> {
        if self.rooms.contains_key(&topic_id) {
            return Err(MeshError::AlreadyJoined);
        }

        // Dial the bootstrap stations first so the endpoint learns a
        // path to them before gossip tries to reach them by id.
        let mut bootstrap_ids = Vec::new();
        for addr in bootstrap {
            let id = addr.id;
            if id == self.endpoint.id() {
                continue;
            }
            debug!(peer = %StationId::new(*id.as_bytes()).short(), "Dialing bootstrap station");
            if let Err(e) = self.endpoint.connect(addr.clone(), GOSSIP_ALPN).await {
                warn!(error = %e, "Failed to reach bootstrap station");
            }
            bootstrap_ids.push(id);
        }

        let mut topic = self
            .gossip
            .subscribe(topic_id.into(), bootstrap_ids.clone())
            .await
            .map_err(|e| MeshError::Subscribe(e.to_string()))?;

        // Wait for the swarm unless we are starting the room alone
        if !bootstrap_ids.is_empty() {
            topic
                .joined()
                .await
                .map_err(|e| MeshError::Subscribe(e.to_string()))?;
        }

        let (sender, receiver) = topic.split();

        let handle = RoomHandle::new(room.to_string(), topic_id, sender, self.secret_key.clone());
        let receiver = RoomReceiver::new(receiver);

        self.rooms.insert(topic_id, handle.clone());

        Ok(SplitRoom {
            sender: handle,
            receiver,
        })
    }

    /// Get an existing room handle (sender only)
    pub fn get_room(&self, room: &str) -> Option<RoomHandle> {
        self.rooms.get(&room_topic_id(room)).map(|r| r.clone())
    }

    /// Drop our handles for a room's topics
    ///
    /// The gossip subscriptions close once the last handle drops.
    pub fn leave_room(&self, room: &str) {
        self.rooms.remove(&room_topic_id(room));
        self.rooms.remove(&presence_topic_id(room));
    }

    /// Number of active topic subscriptions
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Shut down the node, closing the endpoint
    pub async fn shutdown(&self) {
        if let Err(e) = self.router.shutdown().await {
            warn!(error = %e, "Router shutdown error");
        }
        self.endpoint.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_has_no_key() {
        let config = MeshConfig::new();
        assert!(config.secret_key.is_none());
    }

    #[test]
    fn test_config_with_key() {
        let key = SecretKey::generate(&mut rand::rng());
        let key_public = key.public();
        let config = MeshConfig::new().with_secret_key(key);
        assert!(config.secret_key.is_some());
        assert_eq!(config.secret_key.unwrap().public(), key_public);
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let node = MeshNode::spawn(MeshConfig::new()).await.unwrap();
        assert_eq!(node.room_count(), 0);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_join_room_alone() {
        let node = MeshNode::spawn(MeshConfig::new()).await.unwrap();

        let split = node.join_room("commons", &[]).await.unwrap();
        assert_eq!(split.sender.room(), "commons");
        assert_eq!(node.room_count(), 1);

        // A second join of the same room is refused
        assert!(matches!(
            node.join_room("commons", &[]).await,
            Err(MeshError::AlreadyJoined)
        ));

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_ticket_points_at_us() {
        let node = MeshNode::spawn(MeshConfig::new()).await.unwrap();

        let ticket = node.ticket_for("commons");
        assert_eq!(ticket.room, "commons");
        assert_eq!(ticket.bootstrap_ids(), vec![node.endpoint_id()]);

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_persistent_identity() {
        let key = SecretKey::generate(&mut rand::rng());
        let expected = StationId::new(*key.public().as_bytes());

        let node = MeshNode::spawn(MeshConfig::new().with_secret_key(key))
            .await
            .unwrap();
        assert_eq!(node.station_id(), expected);

        node.shutdown().await;
    }
}
