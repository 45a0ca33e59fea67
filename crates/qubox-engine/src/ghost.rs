//! Ghost protocol — secondary escalation counter gated by `prime`.
//!
//! Escalated once per accepted OR transition. While the activation gate
//! holds (`prime > 1` and counter above 3) it writes milestone messages:
//! one "Initiated" on first activation, then a "Protocol state" line each
//! time the scaled value moves.

use crate::messages::MessageLog;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Counter value the ghost protocol must exceed before it can activate.
pub const ACTIVATION_COUNT: u64 = 3;
/// Prime value the machine must exceed before the ghost protocol can activate.
pub const ACTIVATION_PRIME: u32 = 1;

/// Emitted once, on first activation; the sink persists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GhostActivation {
    pub counter: u64,
    pub value: u64,
    pub at: DateTime<Utc>,
}

impl GhostActivation {
    /// One-shot log record: `2026-01-01 00:00:00, GHOST PROTOCOL INITIALIZED, Value: 40`.
    pub fn log_record(&self) -> String {
        format!(
            "{}, GHOST PROTOCOL INITIALIZED, Value: {}",
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.value
        )
    }
}

#[derive(Debug, Clone)]
pub struct GhostProtocol {
    range_multiplier: u64,
    counter: u64,
    last_seen: u64,
    activated: bool,
}

impl GhostProtocol {
    pub fn new(range_multiplier: u64) -> Self {
        Self { range_multiplier, counter: 0, last_seen: 0, activated: false }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn value(&self) -> u64 {
        self.counter.saturating_mul(self.range_multiplier)
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Advance the counter and emit any milestone messages.
    pub fn escalate(&mut self, prime: u32, now: DateTime<Utc>, log: &mut MessageLog) -> Option<GhostActivation> {
        self.counter += 1;
        let current = self.value();

        if prime <= ACTIVATION_PRIME || self.counter <= ACTIVATION_COUNT {
            return None;
        }

        let mut activation = None;
        if !self.activated {
            self.activated = true;
            self.last_seen = current;
            log.push(format!(
                "Ghost Protocol Initiated: {} (Value: {}), Time: {}",
                self.counter,
                current,
                now.format("%H:%M:%S")
            ));
            info!("Ghost protocol initiated at counter {} (value {})", self.counter, current);
            activation = Some(GhostActivation { counter: self.counter, value: current, at: now });
        }

        if current != self.last_seen {
            log.push(format!("Protocol state: {current}"));
            self.last_seen = current;
        }

        activation
    }
}
