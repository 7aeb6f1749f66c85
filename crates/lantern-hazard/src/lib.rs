//! # Lantern Hazard
//!
//! Hazard assessment for the Lantern mesh: earthquake records, the tsunami
//! risk model, evacuation zones, and rescue reports.
//!
//! Everything here is pure bookkeeping and arithmetic; broadcasting an
//! alert over the mesh and serving these records over HTTP are the
//! callers' jobs.

pub mod assess;
pub mod error;
pub mod report;

pub use assess::*;
pub use error::*;
pub use report::*;
