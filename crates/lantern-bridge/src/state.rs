//! Shared state and the outbound hand-off
//!
//! The bridge never touches the mesh directly. Accepted messages go into
//! the station's single outbound channel and the sender task on the other
//! end reports back whether the message left immediately or was queued.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

use lantern_core::{MessageKind, Role, StationId, TeamUnit};
use lantern_hazard::ReportBoard;
use lantern_mesh::PresenceBook;
use lantern_store::MessageArchive;

use crate::error::{BridgeError, BridgeResult};
use crate::routes;

/// The station this bridge fronts
#[derive(Debug, Clone)]
pub struct StationInfo {
    pub id: StationId,
    pub nick: String,
    pub role: Role,
    pub unit: Option<TeamUnit>,
}

/// How an accepted message left the station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Broadcast to the room right away
    Sent,
    /// Held by the courier for later delivery
    Queued,
}

/// A message on its way out of the station
#[derive(Debug)]
pub struct OutboundRequest {
    pub content: String,
    pub role: Role,
    pub kind: MessageKind,
    /// Where to report the outcome; `None` for fire-and-forget sends
    pub outcome_tx: Option<oneshot::Sender<SendOutcome>>,
}

impl OutboundRequest {
    /// Build a request whose outcome the caller waits for
    pub fn new(
        content: impl Into<String>,
        role: Role,
        kind: MessageKind,
    ) -> (Self, oneshot::Receiver<SendOutcome>) {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        (
            Self {
                content: content.into(),
                role,
                kind,
                outcome_tx: Some(outcome_tx),
            },
            outcome_rx,
        )
    }

    /// Build a request nobody waits on
    pub fn fire_and_forget(content: impl Into<String>, role: Role, kind: MessageKind) -> Self {
        Self {
            content: content.into(),
            role,
            kind,
            outcome_tx: None,
        }
    }
}

/// Handles the bridge serves from
#[derive(Clone)]
pub struct BridgeState {
    pub station: Arc<StationInfo>,
    pub archive: Arc<MessageArchive>,
    pub board: Arc<ReportBoard>,
    pub presence: Arc<PresenceBook>,
    pub outbound: mpsc::Sender<OutboundRequest>,
}

impl BridgeState {
    pub fn new(
        station: StationInfo,
        archive: Arc<MessageArchive>,
        board: Arc<ReportBoard>,
        presence: Arc<PresenceBook>,
        outbound: mpsc::Sender<OutboundRequest>,
    ) -> Self {
        Self {
            station: Arc::new(station),
            archive,
            board,
            presence,
            outbound,
        }
    }
}

/// Serve the bridge until the token is cancelled
pub async fn serve(
    addr: SocketAddr,
    state: BridgeState,
    shutdown: CancellationToken,
) -> BridgeResult<()> {
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(BridgeError::Io)?;
    info!(%addr, "HTTP bridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(BridgeError::Io)
}
