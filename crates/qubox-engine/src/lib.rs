//! Qubox Engine — motion-gated binary state machine
//!
//! Pipeline per frame:
//! - Gate accumulator: OR/AND rules over each active cell's (row, col)
//! - Machine: gate counts vs threshold and the reference sequence → ACK/NUL
//! - Ghost protocol: escalation counter gated by `prime`
//! - Rate analyzer: ACK/NUL rates on a wall-clock cadence
//!
//! Single-threaded by construction: the machine owns all counters and is
//! driven one complete frame at a time.

pub mod config;
pub mod entropy;
pub mod gate;
pub mod ghost;
pub mod machine;
pub mod messages;
pub mod rate;
pub mod reference;

pub use config::QuboxConfig;
pub use entropy::BitSource;
pub use machine::{FrameOutcome, Gate, Machine, MachineSnapshot, MachineState, Transition};
pub use rate::{RateAnalyzer, RateSnapshot};
