//! Reference sequence — the ground truth the live state is compared against.
//!
//! Generated once at startup. The only mutation afterwards is an explicit
//! append of paradox sentinels; existing symbols never change.

use crate::config::{parse_pattern, CycleConfig};
use crate::entropy::BitSource;
use qubox_core::{Error, Result, Symbol};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSequence {
    symbols: Vec<Symbol>,
}

impl ReferenceSequence {
    /// `len` uniform bits drawn from `source`.
    pub fn generate(len: usize, source: &mut dyn BitSource) -> Self {
        let symbols = (0..len).map(|_| Symbol::Bit(source.next_bit())).collect();
        Self { symbols }
    }

    /// Parse "0,1,0,1". Sentinels (`9`) are accepted.
    pub fn from_pattern(pattern: &str) -> Result<Self> {
        Ok(Self { symbols: parse_pattern(pattern)? })
    }

    /// Explicit pattern if configured, otherwise a generated sequence.
    pub fn from_config(cycle: &CycleConfig, source: &mut dyn BitSource) -> Result<Self> {
        match &cycle.reference_pattern {
            Some(pattern) => Self::from_pattern(pattern),
            None => Ok(Self::generate(cycle.reference_len, source)),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, cycle: usize) -> Option<Symbol> {
        self.symbols.get(cycle).copied()
    }

    /// Append `count` paradox sentinels. Returns the new length.
    /// Fails without touching the sequence if the space cannot be reserved.
    pub fn extend_paradox(&mut self, count: usize) -> Result<usize> {
        self.symbols
            .try_reserve(count)
            .map_err(|e| Error::internal(format!("cannot extend reference by {count}: {e}")))?;
        self.symbols.extend(std::iter::repeat(Symbol::Paradox).take(count));
        info!("Reference extended by {} paradox symbols (len {})", count, self.symbols.len());
        Ok(self.symbols.len())
    }

    pub fn to_pattern(&self) -> String {
        let mut out = String::with_capacity(self.symbols.len() * 2);
        for (i, s) in self.symbols.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push(s.as_char());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::{ScriptedBits, SeededSource};
    use qubox_core::Bit;

    #[test]
    fn generate_has_requested_length() {
        let mut src = SeededSource::new(3);
        let r = ReferenceSequence::generate(500, &mut src);
        assert_eq!(r.len(), 500);
        assert!(r.get(499).is_some());
        assert!(r.get(500).is_none());
    }

    #[test]
    fn generate_draws_from_source() {
        let mut src = ScriptedBits::new(vec![Bit::One, Bit::One, Bit::Zero]);
        let r = ReferenceSequence::generate(3, &mut src);
        assert_eq!(r.to_pattern(), "1,1,0");
    }

    #[test]
    fn pattern_roundtrip() {
        let r = ReferenceSequence::from_pattern("0,1,0,1").unwrap();
        assert_eq!(r.len(), 4);
        assert_eq!(r.get(1), Some(Symbol::Bit(Bit::One)));
        assert_eq!(r.to_pattern(), "0,1,0,1");
    }

    #[test]
    fn extend_appends_sentinels_only() {
        let mut r = ReferenceSequence::from_pattern("0,1").unwrap();
        assert_eq!(r.extend_paradox(3).unwrap(), 5);
        assert_eq!(r.to_pattern(), "0,1,9,9,9");
        assert_eq!(r.get(0), Some(Symbol::Bit(Bit::Zero)));
    }

    #[test]
    fn oversized_extend_fails_cleanly() {
        let mut r = ReferenceSequence::from_pattern("0,1").unwrap();
        let err = r.extend_paradox(usize::MAX).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(r.to_pattern(), "0,1");
    }

    #[test]
    fn from_config_prefers_pattern() {
        let cycle = CycleConfig {
            longcyc: 3,
            reference_len: 100,
            reference_pattern: Some("1,0,1".into()),
        };
        let mut src = SeededSource::new(0);
        let r = ReferenceSequence::from_config(&cycle, &mut src).unwrap();
        assert_eq!(r.len(), 3);
    }
}
