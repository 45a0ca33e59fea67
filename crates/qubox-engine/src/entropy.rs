//! Random-bit sources for reference generation and `qu` resync.

use qubox_core::Bit;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Source of uniform bits.
pub trait BitSource: Send {
    fn next_bit(&mut self) -> Bit;
}

/// Thread-local RNG, seeded by the OS.
#[derive(Debug, Default)]
pub struct ThreadRngSource;

impl BitSource for ThreadRngSource {
    fn next_bit(&mut self) -> Bit {
        rand::thread_rng().gen_bool(0.5).into()
    }
}

/// Reproducible source: identical seeds give identical bit streams.
#[derive(Debug)]
pub struct SeededSource {
    rng: StdRng,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl BitSource for SeededSource {
    fn next_bit(&mut self) -> Bit {
        self.rng.gen_bool(0.5).into()
    }
}

/// Replays a fixed script of bits, cycling when it runs out.
#[derive(Debug, Clone)]
pub struct ScriptedBits {
    script: Vec<Bit>,
    pending: VecDeque<Bit>,
}

impl ScriptedBits {
    pub fn new(script: Vec<Bit>) -> Self {
        let pending = script.iter().copied().collect();
        Self { script, pending }
    }

    pub fn constant(bit: Bit) -> Self {
        Self::new(vec![bit])
    }
}

impl BitSource for ScriptedBits {
    fn next_bit(&mut self) -> Bit {
        if self.pending.is_empty() {
            self.pending.extend(self.script.iter().copied());
        }
        self.pending.pop_front().unwrap_or_default()
    }
}

/// Pick a source from an optional seed.
pub fn from_seed(seed: Option<u64>) -> Box<dyn BitSource> {
    match seed {
        Some(s) => Box::new(SeededSource::new(s)),
        None => Box::new(ThreadRngSource),
    }
}
