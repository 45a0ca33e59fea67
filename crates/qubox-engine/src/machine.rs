//! State machine core — turns gate counts into accepted transitions.
//!
//! Each frame runs in three steps: accumulate the frame's cells into the
//! gates, evaluate the OR path, then evaluate the AND path. The order is
//! fixed: OR reads and may advance `cycle`/`qu` before AND sees them.
//!
//! - OR accepts when `qu` matches `reference[cycle]`: emits "1", counts a NUL,
//!   raises `prime` (saturating) and escalates the ghost protocol.
//! - AND accepts when `qu` mismatches `reference[cycle]`: emits "0", counts
//!   an ACK, and bumps `prime` (wrapping to 0 once it reaches the threshold).
//!
//! Once `cycle` reaches the end of the reference the machine is exhausted:
//! evidence is still absorbed, nothing is accepted.

use crate::config::QuboxConfig;
use crate::entropy::BitSource;
use crate::gate::{GateAccumulator, GateCounters};
use crate::ghost::{GhostActivation, GhostProtocol};
use crate::messages::MessageLog;
use crate::reference::ReferenceSequence;
use chrono::{DateTime, Utc};
use qubox_core::{Bit, Frame, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Which gate accepted a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    Or,
    And,
}

impl Gate {
    /// Symbol appended to the binary output for this gate.
    pub fn symbol(self) -> char {
        match self {
            Gate::Or => '1',
            Gate::And => '0',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub gate: Gate,
    /// Cycle position the transition consumed.
    pub cycle: usize,
    /// `qu` was resynced from the bit source before accepting.
    pub resynced: bool,
}

/// What one frame did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    pub accepted: Option<Transition>,
    pub ghost_activation: Option<GhostActivation>,
    /// Number of AND-qualifying cells that flipped `qu` while armed.
    pub toggles: u32,
}

/// Live counters. Owned by [`Machine`]; everything else reads it by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineState {
    /// Current binary output (`qu`).
    pub qu: Bit,
    /// Position in the reference sequence (`cyc`).
    pub cycle: usize,
    /// Consecutive accepts since the last resync (`swi`).
    pub switches: u32,
    pub prime: u32,
    /// Accepted AND transitions.
    pub ack: u64,
    /// Accepted OR transitions.
    pub nul: u64,
    /// Set by the first accepted transition, never cleared (`Do`).
    pub armed: bool,
    /// One symbol per accepted transition.
    pub binary: String,
}

impl MachineState {
    pub fn new(qu: Bit) -> Self {
        Self { qu, cycle: 0, switches: 0, prime: 0, ack: 0, nul: 0, armed: false, binary: String::new() }
    }
}

/// Read-only view for status rendering and logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineSnapshot {
    pub qu: Bit,
    pub cycle: usize,
    pub reference_len: usize,
    pub switches: u32,
    pub longcyc: u32,
    pub gates: GateCounters,
    pub corr_threshold: u64,
    pub prime: u32,
    pub prime_threshold: u32,
    pub ghost_counter: u64,
    pub ghost_value: u64,
    pub ack: u64,
    pub nul: u64,
    pub binary_len: usize,
    pub exhausted: bool,
    pub messages: Vec<String>,
}

pub struct Machine {
    corr_threshold: u64,
    longcyc: u32,
    prime_threshold: u32,
    or_duration_threshold: Duration,
    reference: ReferenceSequence,
    gates: GateAccumulator,
    ghost: GhostProtocol,
    messages: MessageLog,
    entropy: Box<dyn BitSource>,
    state: MachineState,
    or_run_started: Option<DateTime<Utc>>,
}

impl Machine {
    /// Validate `config`, generate the reference from `entropy`, zero every counter.
    pub fn new(config: &QuboxConfig, mut entropy: Box<dyn BitSource>) -> Result<Self> {
        config.validate()?;
        let reference = ReferenceSequence::from_config(&config.cycle, entropy.as_mut())?;
        info!(
            "Machine ready: reference len {}, corr {}, longcyc {}, prime threshold {}",
            reference.len(),
            config.gates.corr_threshold,
            config.cycle.longcyc,
            config.ghost.prime_threshold
        );
        Ok(Self {
            corr_threshold: config.gates.corr_threshold,
            longcyc: config.cycle.longcyc,
            prime_threshold: config.ghost.prime_threshold,
            or_duration_threshold: config.or_duration_threshold(),
            reference,
            gates: GateAccumulator::from_config(&config.gates),
            ghost: GhostProtocol::new(config.ghost.range_multiplier),
            messages: MessageLog::new(config.status.message_capacity),
            entropy,
            state: MachineState::new(Bit::Zero),
            or_run_started: None,
        })
    }

    /// Start from a different `qu`.
    pub fn with_initial_bit(mut self, qu: Bit) -> Self {
        self.state.qu = qu;
        self
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn reference(&self) -> &ReferenceSequence {
        &self.reference
    }

    pub fn gates(&self) -> GateCounters {
        self.gates.counters()
    }

    pub fn ghost(&self) -> &GhostProtocol {
        &self.ghost
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageLog {
        &mut self.messages
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.cycle >= self.reference.len()
    }

    /// Administrative: append paradox sentinels to the reference.
    pub fn extend_reference(&mut self, count: usize) -> Result<usize> {
        self.reference.extend_paradox(count)
    }

    /// Process one complete frame.
    pub fn ingest(&mut self, frame: &Frame, now: DateTime<Utc>) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();

        for &cell in &frame.cells {
            let hits = self.gates.observe(cell);
            if hits.and && self.state.armed {
                self.toggle_quantum_state();
                outcome.toggles += 1;
            }
        }

        let (or_accept, activation) = self.evaluate_or(now);
        let and_accept = self.evaluate_and();
        outcome.ghost_activation = activation;
        outcome.accepted = or_accept.or(and_accept);

        debug!(
            cells = frame.cells.len(),
            or = self.gates.or_count(),
            and = self.gates.and_count(),
            cycle = self.state.cycle,
            qu = %self.state.qu,
            "frame"
        );
        outcome
    }

    /// Flip `qu`. Called once per AND-qualifying cell while armed.
    pub fn toggle_quantum_state(&mut self) {
        self.state.qu = self.state.qu.flipped();
    }

    fn evaluate_or(&mut self, now: DateTime<Utc>) -> (Option<Transition>, Option<GhostActivation>) {
        if self.gates.or_count() > self.corr_threshold && !self.is_exhausted() {
            let started = match self.or_run_started {
                Some(t) => t,
                None => {
                    self.messages.push(format!("OR state initiated at {}", now.format("%H:%M:%S")));
                    self.or_run_started = Some(now);
                    now
                }
            };
            let run = run_length(started, now);

            if !self.reference_matches() {
                return (None, None);
            }

            let cycle = self.state.cycle;
            let resynced = self.resync_if_due(false);
            self.state.switches += 1;
            self.state.armed = true;
            self.state.nul += 1;
            self.gates.reset_or();
            self.gates.reset_and();
            self.state.cycle += 1;
            self.state.binary.push(Gate::Or.symbol());
            self.state.prime = (self.state.prime + 1).min(self.prime_threshold);

            if run >= self.or_duration_threshold {
                self.messages.push(format!(
                    "Prolonged OR state detected: Duration {:.2}s, Value: {}",
                    run.as_secs_f64(),
                    self.state.qu
                ));
            }

            let activation = self.ghost.escalate(self.state.prime, now, &mut self.messages);
            debug!(cycle, nul = self.state.nul, prime = self.state.prime, "OR accepted");
            (Some(Transition { gate: Gate::Or, cycle, resynced }), activation)
        } else {
            if let Some(started) = self.or_run_started.take() {
                let run = run_length(started, now);
                if run >= self.or_duration_threshold {
                    self.messages.push(format!("OR state ended after {:.2}s", run.as_secs_f64()));
                }
            }
            (None, None)
        }
    }

    fn evaluate_and(&mut self) -> Option<Transition> {
        if self.gates.and_count() <= self.corr_threshold || self.is_exhausted() {
            return None;
        }
        if self.reference_matches() {
            return None;
        }

        let cycle = self.state.cycle;
        let resynced = self.resync_if_due(true);
        self.state.switches += 1;
        self.state.armed = true;
        self.state.ack += 1;
        self.gates.reset_and();
        self.state.cycle += 1;
        self.state.binary.push(Gate::And.symbol());
        if self.state.prime >= self.prime_threshold {
            self.state.prime = 0;
        } else {
            self.state.prime += 1;
        }

        debug!(cycle, ack = self.state.ack, prime = self.state.prime, "AND accepted");
        Some(Transition { gate: Gate::And, cycle, resynced })
    }

    /// `reference[cycle] == str(qu)`. Only called while not exhausted.
    fn reference_matches(&self) -> bool {
        self.reference.get(self.state.cycle).is_some_and(|s| s.matches(self.state.qu))
    }

    fn resync_if_due(&mut self, reset_prime: bool) -> bool {
        if self.state.switches != self.longcyc {
            return false;
        }
        self.state.qu = self.entropy.next_bit();
        self.state.switches = 0;
        if reset_prime {
            self.state.prime = 0;
        }
        info!("Resync after {} accepts: qu = {}", self.longcyc, self.state.qu);
        true
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            qu: self.state.qu,
            cycle: self.state.cycle,
            reference_len: self.reference.len(),
            switches: self.state.switches,
            longcyc: self.longcyc,
            gates: self.gates.counters(),
            corr_threshold: self.corr_threshold,
            prime: self.state.prime,
            prime_threshold: self.prime_threshold,
            ghost_counter: self.ghost.counter(),
            ghost_value: self.ghost.value(),
            ack: self.state.ack,
            nul: self.state.nul,
            binary_len: self.state.binary.len(),
            exhausted: self.is_exhausted(),
            messages: self.messages.iter().map(str::to_string).collect(),
        }
    }
}

fn run_length(started: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - started).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::ScriptedBits;
    use chrono::TimeZone;
    use qubox_core::Cell;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn machine(pattern: &str, corr: u64, longcyc: u32) -> Machine {
        let mut config = QuboxConfig::default();
        config.cycle.reference_pattern = Some(pattern.into());
        config.gates.corr_threshold = corr;
        config.cycle.longcyc = longcyc;
        Machine::new(&config, Box::new(ScriptedBits::constant(Bit::Zero))).unwrap()
    }

    #[test]
    fn or_accept_on_match() {
        let mut m = machine("0,1,0,1", 0, 3);
        let out = m.ingest(&Frame::new(vec![Cell::new(5, 5)]), t0());
        assert_eq!(out.accepted.map(|t| t.gate), Some(Gate::Or));
        assert_eq!(m.state().nul, 1);
        assert_eq!(m.state().ack, 0);
        assert_eq!(m.state().cycle, 1);
        assert_eq!(m.state().binary, "1");
        assert!(m.state().armed);
        assert_eq!(m.gates(), GateCounters::default());
    }

    #[test]
    fn and_accept_on_mismatch() {
        let mut m = machine("1,1", 0, 3);
        // OR exceeds but reference[0]=1 != qu=0, so OR rejects and AND accepts.
        let out = m.ingest(&Frame::new(vec![Cell::new(5, 5)]), t0());
        assert_eq!(out.accepted.map(|t| t.gate), Some(Gate::And));
        assert_eq!(m.state().ack, 1);
        assert_eq!(m.state().binary, "0");
        assert_eq!(m.state().prime, 1);
        // OR counter is not reset by an AND accept.
        assert_eq!(m.gates().or_count, 1);
    }

    #[test]
    fn below_threshold_does_nothing() {
        let mut m = machine("0,1", 3, 3);
        let out = m.ingest(&Frame::new(vec![Cell::new(5, 5); 3]), t0());
        assert!(out.accepted.is_none());
        assert_eq!(m.gates().or_count, 3);
        assert_eq!(m.state().cycle, 0);
    }

    #[test]
    fn toggle_only_when_armed() {
        let mut m = machine("0,0,0,0", 5, 3);
        let out = m.ingest(&Frame::new(vec![Cell::new(6, 6)]), t0());
        assert_eq!(out.toggles, 0);
        assert_eq!(m.state().qu, Bit::Zero);
        m.state.armed = true;
        let out = m.ingest(&Frame::new(vec![Cell::new(6, 6), Cell::new(6, 0)]), t0());
        assert_eq!(out.toggles, 1);
        assert_eq!(m.state().qu, Bit::One);
    }

    #[test]
    fn or_run_messages() {
        let mut config = QuboxConfig::default();
        config.cycle.reference_pattern = Some("1,1,1".into());
        config.gates.corr_threshold = 0;
        config.status.or_duration_threshold_secs = 1.0;
        let mut m = Machine::new(&config, Box::new(ScriptedBits::constant(Bit::Zero))).unwrap();

        // Column-only evidence: OR exceeds, AND does not, reference mismatches.
        m.ingest(&Frame::new(vec![Cell::new(0, 5)]), t0());
        m.ingest(&Frame::new(vec![]), t0() + chrono::Duration::seconds(2));
        // Still exceeding: no new messages.
        assert_eq!(m.messages().len(), 1);
        assert!(m.messages().iter().next().unwrap().starts_with("OR state initiated at 00:00:00"));

        m.gates.reset_or();
        m.ingest(&Frame::empty(), t0() + chrono::Duration::seconds(3));
        let msgs: Vec<&str> = m.messages().iter().collect();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1], "OR state ended after 3.00s");
    }

    /// OR exceeds from t0 against a mismatching "1"; an AND accept moves the
    /// cycle onto "0"; the next frame accepts on OR at `end_secs`.
    fn or_run_then_accept(end_secs: i64) -> Machine {
        let mut m = machine("1,0", 1, 3);
        m.ingest(&Frame::new(vec![Cell::new(0, 5), Cell::new(0, 6)]), t0());
        let out = m.ingest(
            &Frame::new(vec![Cell::new(5, 5), Cell::new(6, 6)]),
            t0() + chrono::Duration::seconds(end_secs - 1),
        );
        assert_eq!(out.accepted.map(|t| t.gate), Some(Gate::And));
        let out = m.ingest(&Frame::empty(), t0() + chrono::Duration::seconds(end_secs));
        assert_eq!(out.accepted.map(|t| t.gate), Some(Gate::Or));
        m
    }

    #[test]
    fn prolonged_or_accept_is_reported() {
        let m = or_run_then_accept(5);
        let msgs: Vec<&str> = m.messages().iter().collect();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].starts_with("OR state initiated at 00:00:00"));
        assert_eq!(msgs[1], "Prolonged OR state detected: Duration 5.00s, Value: 0");
    }

    #[test]
    fn short_or_accept_is_not_prolonged() {
        let m = or_run_then_accept(2);
        assert_eq!(m.messages().len(), 1);
        assert!(m.messages().iter().all(|msg| !msg.starts_with("Prolonged")));
        assert_eq!(m.state().binary, "01");
    }
}
