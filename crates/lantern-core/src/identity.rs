//! Station identity
//!
//! A station is named by the 32-byte ed25519 public key of its transport
//! endpoint. Everything above the transport refers to stations by this
//! wrapper rather than by iroh types, so the logic crates stay free of
//! transport dependencies.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A station's public identity on the mesh
///
/// Ordering is byte-lexicographic, which the mesh layer relies on for its
/// introduction tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId(pub [u8; 32]);

impl StationId {
    /// Create from raw public key bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// First eight hex characters, the form used in logs and fallbacks
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// The raw key bytes
    pub fn as_array(&self) -> &[u8; 32] {
        &self.0
    }

    /// Stable 64-bit hash of this identity, used for message id origins
    pub fn origin_hash(&self) -> u64 {
        let digest = blake3::hash(&self.0);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(buf)
    }
}

impl Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short())
    }
}
