//! HTTP bridge between browser consoles and a Lantern station
//!
//! Exposes the station's archive, presence roster, and hazard board over
//! plain JSON endpoints so the existing web consoles keep working without
//! speaking gossip themselves. The bridge holds no mesh state of its own:
//! reads come straight from the shared archive and board, and sends are
//! handed to the station's outbound channel, which reports back whether
//! the message went out immediately or was queued for later delivery.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{BridgeError, BridgeResult};
pub use routes::{DisplayMessage, PeerEntry, router};
pub use state::{BridgeState, OutboundRequest, SendOutcome, StationInfo, serve};
