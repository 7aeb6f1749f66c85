//! Station wiring
//!
//! Everything the daemon runs lives here: the mesh node and its two topic
//! subscriptions, the archive and hazard board, the courier loops, the
//! single outbound path, and (optionally) the HTTP bridge. The console in
//! the foreground and the bridge handlers both talk to the mesh through
//! one mpsc channel; the sender task on the other end is the only place
//! messages are minted, so sequence numbers cannot collide.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lantern_bridge::{BridgeState, OutboundRequest, SendOutcome, StationInfo};
use lantern_core::{ChatMessage, MessageId, MessageKind, StationId};
use lantern_courier::{CourierQueue, DeliveryEvent, DeliveryTracker, Parcel, SeenCache};
use lantern_hazard::{BoardRecord, ReportBoard};
use lantern_mesh::{
    MeshConfig, MeshEvent, MeshNode, PresenceBeacon, PresenceBook, RoomHandle, RoomReceiver,
    RoomTicket,
};
use lantern_store::{
    DEFAULT_MAX_MESSAGES, JsonlLog, MessageArchive, MessageFilter, StoreError, StoredMessage,
};

use crate::config::NodeConfig;
use crate::console::{self, Console};
use crate::keystore;
use crate::sequence::SequenceCounter;

/// How often the housekeeping sweep runs
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(15);

/// Parcels taken per drain pass
const DRAIN_BATCH: usize = 32;

/// Run a station until Ctrl+C or `/quit`
pub async fn run(
    config: NodeConfig,
    ticket: Option<RoomTicket>,
    print_ticket: bool,
) -> anyhow::Result<()> {
    for warning in config.validate() {
        warn!(%warning, "Configuration warning");
    }

    let mesh_config = if config.ephemeral {
        MeshConfig::new()
    } else {
        MeshConfig::new().with_secret_key(keystore::load_or_generate(&config.data_dir)?)
    };
    let mesh = MeshNode::spawn(mesh_config).await?;
    let station_id = mesh.station_id();
    let nick = config
        .nick
        .clone()
        .unwrap_or_else(|| format!("station-{}", station_id.short()));

    // A ticket carries both the room name and who to dial; a bare room
    // name starts (or rejoins) the room with no bootstrap.
    let (room_name, bootstrap) = match &ticket {
        Some(ticket) => (ticket.room.clone(), ticket.bootstrap.clone()),
        None => (config.room.clone(), Vec::new()),
    };

    info!(room = %room_name, nick = %nick, role = %config.role, "Joining room");
    let chat = mesh.join_room(&room_name, &bootstrap).await?;
    let presence_topic = mesh.join_presence(&room_name, &bootstrap).await?;

    let room_ticket = mesh.ticket_for(&room_name);
    if print_ticket {
        println!("{}", room_ticket);
    }

    let archive = if config.ephemeral {
        Arc::new(MessageArchive::in_memory(DEFAULT_MAX_MESSAGES))
    } else {
        let path = config.data_dir.join("messages.jsonl");
        Arc::new(
            MessageArchive::persistent(&path, DEFAULT_MAX_MESSAGES)
                .await
                .with_context(|| format!("failed to open archive at {}", path.display()))?,
        )
    };

    let board = Arc::new(ReportBoard::new());
    let shutdown = CancellationToken::new();
    if !config.ephemeral {
        spawn_board_log(
            board.clone(),
            config.data_dir.join("reports.jsonl"),
            shutdown.clone(),
        )
        .await?;
    }

    let courier = config.courier.to_config();
    let queue = Arc::new(CourierQueue::new(courier.max_queued));
    let seen = Arc::new(SeenCache::new(courier.seen_ttl));
    let tracker = Arc::new(DeliveryTracker::new(courier.ack_deadline));
    let presence = Arc::new(PresenceBook::new(station_id, config.peer_timeout()));
    let joined = Arc::new(AtomicBool::new(false));

    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundRequest>(64);

    // The archive's high-water mark only floors the counter; the counter
    // file is what survives archive eviction.
    let sequence = if config.ephemeral {
        SequenceCounter::ephemeral()
    } else {
        SequenceCounter::open(&config.data_dir, resume_sequence(&archive, station_id)?)?
    };

    let outbound = Arc::new(Outbound {
        room: chat.sender.clone(),
        archive: archive.clone(),
        queue: queue.clone(),
        tracker: tracker.clone(),
        seen: seen.clone(),
        joined: joined.clone(),
        station_id,
        nick: nick.clone(),
        sequence,
        lifetime: courier.parcel_lifetime(),
        max_attempts: courier.max_attempts,
    });

    tokio::spawn(run_outbound(outbound.clone(), outbound_rx, shutdown.clone()));
    tokio::spawn(run_room_events(
        chat.receiver,
        RoomEventContext {
            station_id,
            room: chat.sender.clone(),
            archive: archive.clone(),
            queue: queue.clone(),
            tracker: tracker.clone(),
            seen: seen.clone(),
            presence: presence.clone(),
            joined: joined.clone(),
            max_attempts: courier.max_attempts,
        },
        shutdown.clone(),
    ));
    tokio::spawn(run_presence_events(
        presence_topic.receiver,
        presence_topic.sender.clone(),
        presence.clone(),
        local_beacon(&config, &nick),
        shutdown.clone(),
    ));
    tokio::spawn(run_announcer(
        presence_topic.sender,
        local_beacon(&config, &nick),
        config.announce_interval(),
        shutdown.clone(),
    ));
    tokio::spawn(run_housekeeping(
        queue.clone(),
        tracker.clone(),
        seen.clone(),
        presence.clone(),
        shutdown.clone(),
    ));
    tokio::spawn(run_delivery_log(tracker.subscribe(), shutdown.clone()));

    if config.http {
        let state = BridgeState::new(
            StationInfo {
                id: station_id,
                nick: nick.clone(),
                role: config.role,
                unit: config.unit,
            },
            archive.clone(),
            board.clone(),
            presence.clone(),
            outbound_tx.clone(),
        );
        let addr = config.http_addr;
        let bridge_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = lantern_bridge::serve(addr, state, bridge_shutdown).await {
                error!(error = %e, "HTTP bridge stopped");
            }
        });
    }

    // Greet the room so other consoles see the station come up
    let greeting = OutboundRequest::fire_and_forget(
        format!("station {} online", nick),
        config.role,
        MessageKind::Status,
    );
    if outbound_tx.send(greeting).await.is_err() {
        warn!("Outbound channel closed before the greeting went out");
    }

    console::run(
        Console {
            outbound: outbound_tx,
            presence: presence.clone(),
            ticket: room_ticket,
            role: config.role,
            nick,
        },
        shutdown.clone(),
    )
    .await;

    info!("Shutting down");
    shutdown.cancel();
    if let Err(e) = archive.flush().await {
        warn!(error = %e, "Failed to flush archive during shutdown");
    }
    mesh.shutdown().await;
    Ok(())
}

fn local_beacon(config: &NodeConfig, nick: &str) -> PresenceBeacon {
    PresenceBeacon::new(Some(nick.to_string()), config.role, config.unit)
}

/// Floor for the sequence counter: one past anything this station still
/// has archived. Data dirs that predate the counter file resume from
/// here; everything newer trusts the persisted reservation instead.
fn resume_sequence(archive: &MessageArchive, station_id: StationId) -> anyhow::Result<u64> {
    let origin_hash = station_id.origin_hash();
    let next = archive
        .query(&MessageFilter::new())?
        .iter()
        .filter(|stored| stored.local && stored.message.id.origin_hash == origin_hash)
        .map(|stored| stored.message.id.sequence + 1)
        .max()
        .unwrap_or(0);
    Ok(next)
}

/// State for the single sender task
struct Outbound {
    room: RoomHandle,
    archive: Arc<MessageArchive>,
    queue: Arc<CourierQueue>,
    tracker: Arc<DeliveryTracker>,
    seen: Arc<SeenCache>,
    joined: Arc<AtomicBool>,
    station_id: StationId,
    nick: String,
    sequence: SequenceCounter,
    lifetime: chrono::Duration,
    max_attempts: u32,
}

async fn run_outbound(
    outbound: Arc<Outbound>,
    mut rx: mpsc::Receiver<OutboundRequest>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            request = rx.recv() => {
                let Some(request) = request else { break };
                outbound.handle(request).await;
            }
        }
    }
}

impl Outbound {
    /// Mint, archive, then transmit or queue
    async fn handle(&self, request: OutboundRequest) {
        let id = MessageId::new(self.station_id.origin_hash(), self.sequence.next());
        let message = match ChatMessage::new(id, request.content, request.role, request.kind) {
            Ok(message) => message.with_nick(&self.nick),
            Err(e) => {
                warn!(error = %e, "Dropped unsendable message");
                return;
            }
        };

        // Mark our own id seen so relayed copies are not re-archived
        self.seen.insert_if_new(id);
        if let Err(e) = self.archive.append(StoredMessage::local(message.clone())).await {
            warn!(error = %e, %id, "Failed to archive outbound message");
        }

        let outcome = self.transmit(message).await;
        if let Some(tx) = request.outcome_tx {
            let _ = tx.send(outcome);
        }
    }

    /// Broadcast with one instant retry, falling back to the courier
    async fn transmit(&self, message: ChatMessage) -> SendOutcome {
        if self.joined.load(Ordering::Relaxed) {
            for attempt in 0..2u32 {
                match self.room.broadcast_chat(&message).await {
                    Ok(()) => {
                        if message.wants_ack() {
                            self.tracker.track(message.id, message.kind);
                        }
                        debug!(id = %message.id, "Message broadcast");
                        return SendOutcome::Sent;
                    }
                    Err(e) => {
                        warn!(error = %e, id = %message.id, attempt, "Broadcast failed");
                    }
                }
            }
        }

        let id = message.id;
        let mut parcel = Parcel::new(message, self.lifetime);
        // The queue counts attempts against the retry budget
        if !self.joined.load(Ordering::Relaxed) {
            debug!(%id, "Mesh unreachable, queueing");
        } else {
            parcel.record_attempt();
        }
        match self.queue.enqueue(parcel) {
            Ok(_) => SendOutcome::Queued,
            Err(e) => {
                // Already archived; the record survives even when the
                // queue cannot hold the parcel
                error!(error = %e, %id, "Failed to queue message");
                self.tracker.note_failed(id, 0);
                SendOutcome::Queued
            }
        }
    }
}

/// Shared handles for the room event loop
struct RoomEventContext {
    station_id: StationId,
    room: RoomHandle,
    archive: Arc<MessageArchive>,
    queue: Arc<CourierQueue>,
    tracker: Arc<DeliveryTracker>,
    seen: Arc<SeenCache>,
    presence: Arc<PresenceBook>,
    joined: Arc<AtomicBool>,
    max_attempts: u32,
}

async fn run_room_events(
    mut receiver: RoomReceiver,
    ctx: RoomEventContext,
    shutdown: CancellationToken,
) {
    let neighbors = AtomicUsize::new(0);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = receiver.recv() => {
                match event {
                    Some(Ok(event)) => handle_room_event(&ctx, &neighbors, event).await,
                    Some(Err(e)) => {
                        warn!(error = %e, "Room event stream error");
                        break;
                    }
                    None => {
                        debug!("Room topic closed");
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_room_event(ctx: &RoomEventContext, neighbors: &AtomicUsize, event: MeshEvent) {
    match event {
        MeshEvent::Joined { neighbors: present } => {
            neighbors.store(present.len(), Ordering::Relaxed);
            ctx.joined.store(true, Ordering::Relaxed);
            info!(neighbors = present.len(), "Joined the room swarm");
            drain_queue(ctx).await;
        }
        MeshEvent::NeighborUp(peer) => {
            neighbors.fetch_add(1, Ordering::Relaxed);
            ctx.joined.store(true, Ordering::Relaxed);
            debug!(peer = %peer, "Neighbor up");
            drain_queue(ctx).await;
        }
        MeshEvent::NeighborDown(peer) => {
            let before = neighbors.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
            debug!(peer = %peer, "Neighbor down");
            if before == Ok(1) {
                ctx.joined.store(false, Ordering::Relaxed);
                info!("Last neighbor gone, mesh unreachable");
            }
        }
        MeshEvent::MessageReceived {
            from,
            message,
            sent_at: _,
            verified,
        } => {
            handle_message(ctx, from, message, verified).await;
        }
        MeshEvent::AckReceived { from, id } => {
            ctx.tracker.confirm(id, from);
        }
        MeshEvent::PresenceReceived { from, beacon } => {
            // Some stations beacon on the chat topic; keep the roster fed
            ctx.presence.observe(from, &beacon);
        }
        MeshEvent::Lagged => {
            warn!("Fell behind the gossip stream; some frames were missed");
        }
    }
}

async fn handle_message(
    ctx: &RoomEventContext,
    from: StationId,
    message: ChatMessage,
    verified: bool,
) {
    if from == ctx.station_id {
        return;
    }
    let id = message.id;
    if !ctx.seen.insert_if_new(id) {
        debug!(%id, "Duplicate message suppressed");
        return;
    }

    // Acks only confirm signed traffic; a legacy pseudo-identity is
    // nobody to confirm to
    let wants_ack = verified && message.wants_ack();

    let stored = StoredMessage::remote(message, from);
    info!(
        sender = %stored.sender,
        role = %stored.message.role,
        kind = ?stored.message.kind,
        content = %stored.message.content,
        "Message received"
    );
    match ctx.archive.append(stored).await {
        Ok(_) => {}
        Err(StoreError::Duplicate(_)) => debug!(%id, "Message already archived"),
        Err(e) => warn!(error = %e, %id, "Failed to archive message"),
    }

    if wants_ack
        && let Err(e) = ctx.room.broadcast_ack(id).await
    {
        warn!(error = %e, %id, "Failed to send delivery confirmation");
    }
}

/// Forward queued parcels while the transport cooperates
async fn drain_queue(ctx: &RoomEventContext) {
    loop {
        let batch = match ctx.queue.drain_ready(DRAIN_BATCH) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Failed to drain courier queue");
                return;
            }
        };
        if batch.is_empty() {
            return;
        }

        for mut parcel in batch {
            parcel.record_attempt();
            match ctx.room.broadcast_chat(&parcel.message).await {
                Ok(()) => {
                    info!(id = %parcel.id(), attempts = parcel.attempts, "Queued message forwarded");
                    if parcel.message.wants_ack() {
                        ctx.tracker.track(parcel.id(), parcel.message.kind);
                    }
                }
                Err(e) => {
                    warn!(error = %e, id = %parcel.id(), "Forwarding failed");
                    if parcel.attempts_exhausted(ctx.max_attempts) {
                        ctx.tracker.note_failed(parcel.id(), parcel.attempts);
                    } else if let Err(e) = ctx.queue.requeue(parcel) {
                        warn!(error = %e, "Failed to requeue parcel");
                    }
                    // The transport is unhappy; wait for the next trigger
                    return;
                }
            }
        }
    }
}

async fn run_presence_events(
    mut receiver: RoomReceiver,
    sender: RoomHandle,
    presence: Arc<PresenceBook>,
    local: PresenceBeacon,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = receiver.recv() => {
                match event {
                    Some(Ok(MeshEvent::PresenceReceived { from, beacon })) => {
                        let new = presence.observe(from, &beacon);
                        // Introduce ourselves to a first sighting so the
                        // peer does not wait a full announce interval;
                        // the id tie-break stops both sides doing it
                        if new && presence.should_introduce(from) {
                            let beacon = PresenceBeacon::new(
                                local.nick.clone(),
                                local.role,
                                local.unit,
                            );
                            if let Err(e) = sender.broadcast_presence(&beacon).await {
                                debug!(error = %e, "Introduction beacon failed");
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Presence event stream error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

async fn run_announcer(
    sender: RoomHandle,
    local: PresenceBeacon,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let beacon = PresenceBeacon::new(local.nick.clone(), local.role, local.unit);
                if let Err(e) = sender.broadcast_presence(&beacon).await {
                    debug!(error = %e, "Presence beacon failed");
                }
            }
        }
    }
}

/// Periodic expiry sweeps for every TTL-bounded structure
async fn run_housekeeping(
    queue: Arc<CourierQueue>,
    tracker: Arc<DeliveryTracker>,
    seen: Arc<SeenCache>,
    presence: Arc<PresenceBook>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match queue.expire_due() {
                    Ok(expired) => {
                        for parcel in expired {
                            warn!(id = %parcel.id(), "Parcel expired before delivery");
                            tracker.note_expired(parcel.id());
                        }
                    }
                    Err(e) => warn!(error = %e, "Queue expiry sweep failed"),
                }
                tracker.check_overdue();
                seen.purge_expired();
                presence.sweep();
            }
        }
    }
}

async fn run_delivery_log(
    mut events: broadcast::Receiver<DeliveryEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => {
                match event {
                    Ok(DeliveryEvent::Delivered { id, by, waited }) => {
                        info!(%id, by = %by, waited_ms = waited.as_millis() as u64, "Delivery confirmed");
                    }
                    Ok(DeliveryEvent::Unconfirmed { id }) => {
                        warn!(%id, "No delivery confirmation before the deadline");
                    }
                    Ok(DeliveryEvent::Expired { id }) => {
                        warn!(%id, "Message expired undelivered");
                    }
                    Ok(DeliveryEvent::Failed { id, attempts }) => {
                        warn!(%id, attempts, "Gave up forwarding message");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed delivery events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Replay the report log into the board, then append new records as they
/// land
async fn spawn_board_log(
    board: Arc<ReportBoard>,
    path: std::path::PathBuf,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let log: JsonlLog<BoardRecord> = JsonlLog::open(&path)
        .await
        .with_context(|| format!("failed to open report log at {}", path.display()))?;
    for record in log.load().await? {
        board.replay(record);
    }

    let mut records = board.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                record = records.recv() => {
                    match record {
                        Ok(record) => {
                            if let Err(e) = log.append(&record).await {
                                warn!(error = %e, "Failed to persist report");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Missed reports while persisting");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::Role;

    fn stored(station: StationId, sequence: u64, local: bool) -> StoredMessage {
        let message = ChatMessage::new(
            MessageId::new(station.origin_hash(), sequence),
            "resume test",
            Role::Civilian,
            MessageKind::Text,
        )
        .unwrap();
        if local {
            StoredMessage::local(message)
        } else {
            StoredMessage::remote(message, station)
        }
    }

    #[tokio::test]
    async fn test_resume_sequence_empty_archive() {
        let archive = MessageArchive::in_memory(0);
        let station = StationId::new([1; 32]);
        assert_eq!(resume_sequence(&archive, station).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resume_sequence_skips_past_local_messages() {
        let archive = MessageArchive::in_memory(0);
        let ours = StationId::new([1; 32]);
        let theirs = StationId::new([2; 32]);

        archive.append(stored(ours, 0, true)).await.unwrap();
        archive.append(stored(ours, 7, true)).await.unwrap();
        // Remote traffic never advances our counter
        archive.append(stored(theirs, 99, false)).await.unwrap();

        assert_eq!(resume_sequence(&archive, ours).unwrap(), 8);
        assert_eq!(resume_sequence(&archive, theirs).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_board_log_replays_across_restart() {
        use lantern_core::GeoPoint;
        use lantern_hazard::Earthquake;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.jsonl");
        let epicenter = GeoPoint::new(13.08, 80.27).unwrap();

        {
            let board = Arc::new(ReportBoard::new());
            let shutdown = CancellationToken::new();
            spawn_board_log(board.clone(), path.clone(), shutdown.clone())
                .await
                .unwrap();
            board.record_earthquake(Earthquake::new(7.4, epicenter).unwrap());
            // Give the persistence task a moment to write the record
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.cancel();
        }

        let board = Arc::new(ReportBoard::new());
        spawn_board_log(board.clone(), path, CancellationToken::new())
            .await
            .unwrap();
        let quakes = board.earthquakes_since(None);
        assert_eq!(quakes.len(), 1);
        assert_eq!(quakes[0].magnitude, 7.4);
    }
}
