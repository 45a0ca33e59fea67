//! qubox — motion-gated binary state machine runtime
//!
//! Wires the engine to the outside world:
//! - `source`: upstream frame sources and the single-consumer producer
//! - `runner`: frame loop, cadence-gated status refresh, shutdown hook
//! - `status`: console block and delimited log record
//! - `sink`: append-only status log

pub mod runner;
pub mod sink;
pub mod source;
pub mod status;

pub use runner::{RunSummary, Runner};
