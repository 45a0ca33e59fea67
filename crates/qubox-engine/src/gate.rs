//! OR/AND gate accumulation over active cells.

use crate::config::GateConfig;
use qubox_core::Cell;
use serde::Serialize;

/// Exclusive evidence band: a value qualifies when `low < v < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub low: u32,
    pub high: u32,
}

impl Band {
    pub fn new(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, v: u32) -> bool {
        self.low < v && v < self.high
    }
}

impl Default for Band {
    fn default() -> Self {
        Self { low: 4, high: 11 }
    }
}

/// Which rules a single cell satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateHits {
    pub or: bool,
    pub and: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateCounters {
    pub or_count: u64,
    pub and_count: u64,
}

#[derive(Debug, Clone)]
pub struct GateAccumulator {
    band: Band,
    counters: GateCounters,
}

impl GateAccumulator {
    pub fn new(band: Band) -> Self {
        Self { band, counters: GateCounters::default() }
    }

    pub fn from_config(gates: &GateConfig) -> Self {
        Self::new(Band::new(gates.band_low, gates.band_high))
    }

    /// Apply both rules to one cell and bump the matching counters.
    pub fn observe(&mut self, cell: Cell) -> GateHits {
        let row_in = self.band.contains(cell.row);
        let col_in = self.band.contains(cell.col);
        let hits = GateHits { or: row_in || col_in, and: row_in && col_in };
        if hits.or {
            self.counters.or_count += 1;
        }
        if hits.and {
            self.counters.and_count += 1;
        }
        hits
    }

    pub fn counters(&self) -> GateCounters {
        self.counters
    }

    pub fn or_count(&self) -> u64 {
        self.counters.or_count
    }

    pub fn and_count(&self) -> u64 {
        self.counters.and_count
    }

    pub fn reset_or(&mut self) {
        self.counters.or_count = 0;
    }

    pub fn reset_and(&mut self) {
        self.counters.and_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_is_exclusive() {
        let b = Band::default();
        assert!(!b.contains(4));
        assert!(b.contains(5));
        assert!(b.contains(10));
        assert!(!b.contains(11));
    }

    #[test]
    fn or_only_when_one_axis_in_band() {
        let mut g = GateAccumulator::new(Band::default());
        let hits = g.observe(Cell::new(5, 0));
        assert_eq!(hits, GateHits { or: true, and: false });
        assert_eq!(g.counters(), GateCounters { or_count: 1, and_count: 0 });
    }

    #[test]
    fn and_implies_or() {
        let mut g = GateAccumulator::new(Band::default());
        let hits = g.observe(Cell::new(6, 10));
        assert_eq!(hits, GateHits { or: true, and: true });
        assert_eq!(g.counters(), GateCounters { or_count: 1, and_count: 1 });
    }

    #[test]
    fn outside_band_counts_nothing() {
        let mut g = GateAccumulator::new(Band::default());
        g.observe(Cell::new(0, 15));
        g.observe(Cell::new(4, 11));
        assert_eq!(g.counters(), GateCounters::default());
    }

    #[test]
    fn counts_once_per_cell() {
        let mut g = GateAccumulator::new(Band::default());
        for c in [Cell::new(5, 5), Cell::new(5, 5), Cell::new(1, 7)] {
            g.observe(c);
        }
        assert_eq!(g.or_count(), 3);
        assert_eq!(g.and_count(), 2);
        g.reset_or();
        assert_eq!(g.or_count(), 0);
        assert_eq!(g.and_count(), 2);
    }
}
