//! # Lantern Store
//!
//! The station's message archive: every message seen on the mesh or
//! accepted over HTTP lands here, in arrival order, and the polling
//! endpoint serves straight out of it.
//!
//! The archive is an in-memory map with an optional append-only JSONL log
//! behind it. Writes go to the log first, then memory; on startup the log
//! is replayed, so a station that restarts mid-incident still has its
//! record.
//!
//! ## Key Types
//!
//! - [`MessageArchive`]: the archive itself
//! - [`MessageFilter`]: builder-style query criteria
//! - [`JsonlLog`]: the append-only line log (also used for hazard records)

pub mod archive;
pub mod error;
pub mod filter;
pub mod log;

pub use archive::*;
pub use error::*;
pub use filter::*;
pub use log::*;
