//! Shareable tickets for joining rooms.
//!
//! Provides a human-shareable format for room invitations.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use iroh::{EndpointAddr, EndpointId};
use serde::{Deserialize, Serialize};

use crate::error::{MeshError, MeshResult};

/// The URI scheme prefix for room tickets.
const TICKET_PREFIX: &str = "lantern:room:";

/// A human-shareable ticket for joining a room.
///
/// Tickets can be shared as text, printed on paper, or read out over
/// voice radio.
///
/// # Format
///
/// ```text
/// lantern:room:<base64-encoded-ticket>
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct RoomTicket {
    /// Room name this ticket grants entry to
    pub room: String,
    /// Stations to dial for the initial join
    pub bootstrap: Vec<EndpointAddr>,
}

impl RoomTicket {
    /// Create a new ticket for a room.
    pub fn new(room: impl Into<String>, bootstrap: Vec<EndpointAddr>) -> Self {
        Self {
            room: room.into(),
            bootstrap,
        }
    }

    /// Parse a ticket from a string.
    ///
    /// Accepts both the full URI format (`lantern:room:...`) and
    /// raw base64-encoded tickets.
    pub fn parse(s: &str) -> MeshResult<Self> {
        let s = s.trim();

        // Strip the prefix if present
        let base64_part = if let Some(stripped) = s.strip_prefix(TICKET_PREFIX) {
            stripped
        } else if s.starts_with("lantern:") {
            return Err(MeshError::InvalidTicket(
                "Unknown ticket type (expected 'room')".to_string(),
            ));
        } else {
            s
        };

        // Decode base64
        let bytes = URL_SAFE_NO_PAD
            .decode(base64_part)
            .map_err(|e| MeshError::InvalidTicket(format!("Invalid base64: {}", e)))?;

        // Deserialize the ticket
        let ticket: RoomTicket = postcard::from_bytes(&bytes)
            .map_err(|e| MeshError::InvalidTicket(format!("Invalid ticket data: {}", e)))?;

        Ok(ticket)
    }

    /// Station ids of the bootstrap addresses.
    pub fn bootstrap_ids(&self) -> Vec<EndpointId> {
        self.bootstrap.iter().map(|addr| addr.id).collect()
    }

    /// Convert to a shareable string in URI format.
    pub fn to_uri(&self) -> String {
        format!("{}{}", TICKET_PREFIX, self.to_base64())
    }

    /// Convert to raw base64-encoded format.
    pub fn to_base64(&self) -> String {
        let bytes = postcard::to_allocvec(self).expect("serialization should not fail");
        URL_SAFE_NO_PAD.encode(&bytes)
    }
}

impl fmt::Debug for RoomTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomTicket")
            .field("room", &self.room)
            .field("bootstrap", &self.bootstrap.len())
            .finish()
    }
}

impl fmt::Display for RoomTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl FromStr for RoomTicket {
    type Err = MeshError;

    fn from_str(s: &str) -> MeshResult<Self> {
        Self::parse(s)
    }
}
