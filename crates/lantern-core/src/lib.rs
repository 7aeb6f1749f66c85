//! # Lantern Core
//!
//! Core types for the Lantern emergency communication mesh.
//!
//! This crate provides the vocabulary shared by every other Lantern crate:
//! who is talking ([`StationId`], [`Role`]), what they are saying
//! ([`ChatMessage`], [`MessageKind`]), and where they are
//! ([`GeoPoint`], [`LocationReport`]).
//!
//! ## Key Types
//!
//! - [`StationId`]: A station's public-key identity on the mesh
//! - [`Role`]: Civilian or rescue-team side of a conversation
//! - [`ChatMessage`]: A single message as it travels through the mesh
//! - [`LocationReport`]: A position fix with the standard broadcast formats

pub mod error;
pub mod identity;
pub mod location;
pub mod message;
pub mod role;

// Re-export main types
pub use error::*;
pub use identity::*;
pub use location::*;
pub use message::*;
pub use role::*;
