//! Core types for Qubox

use serde::{Deserialize, Serialize};

/// Live binary output of the machine (`qu`).
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Bit {
    #[default]
    Zero,
    One,
}

impl Bit {
    pub fn flipped(self) -> Self {
        match self {
            Bit::Zero => Bit::One,
            Bit::One => Bit::Zero,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Bit::Zero => '0',
            Bit::One => '1',
        }
    }
}

impl From<bool> for Bit {
    fn from(b: bool) -> Self {
        if b {
            Bit::One
        } else {
            Bit::Zero
        }
    }
}

impl From<Bit> for u8 {
    fn from(b: Bit) -> Self {
        match b {
            Bit::Zero => 0,
            Bit::One => 1,
        }
    }
}

impl TryFrom<u8> for Bit {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0 => Ok(Bit::Zero),
            1 => Ok(Bit::One),
            other => Err(format!("bit must be 0 or 1, got {other}")),
        }
    }
}

impl std::fmt::Display for Bit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One entry of the reference sequence.
///
/// `Paradox` is the sentinel appended by reference extension; it never
/// matches a live bit.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Symbol {
    Bit(Bit),
    Paradox,
}

impl Symbol {
    pub const PARADOX_CHAR: char = '9';

    /// True when this symbol reads the same as `bit` (the `reference[cyc] == str(qu)` test).
    pub fn matches(self, bit: Bit) -> bool {
        matches!(self, Symbol::Bit(b) if b == bit)
    }

    pub fn as_char(self) -> char {
        match self {
            Symbol::Bit(b) => b.as_char(),
            Symbol::Paradox => Self::PARADOX_CHAR,
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "0" => Some(Symbol::Bit(Bit::Zero)),
            "1" => Some(Symbol::Bit(Bit::One)),
            "9" => Some(Symbol::Paradox),
            _ => None,
        }
    }
}

impl From<Bit> for Symbol {
    fn from(b: Bit) -> Self {
        Symbol::Bit(b)
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A grid cell where motion exceeded the sensitivity threshold.
///
/// Row and column double as the two evidence values fed to the gates.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
}

impl Cell {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl From<(u32, u32)> for Cell {
    fn from((row, col): (u32, u32)) -> Self {
        Self { row, col }
    }
}

/// Complete, immutable evidence for one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub cells: Vec<Cell>,
}

impl Frame {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a frame from a row-major grid of changed-pixel counts.
    /// A cell is active when its count is strictly greater than `sensitivity`.
    pub fn from_counts(counts: &[Vec<u32>], sensitivity: u32) -> Self {
        let cells = counts
            .iter()
            .enumerate()
            .flat_map(|(row, cols)| {
                cols.iter()
                    .enumerate()
                    .filter(move |(_, &count)| count > sensitivity)
                    .map(move |(col, _)| Cell::new(row as u32, col as u32))
            })
            .collect();
        Self { cells }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }
}

/// Item handed from the producer to the single consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedItem {
    Frame(Frame),
    /// Administrative: append `count` paradox sentinels to the reference sequence.
    ExtendReference { count: usize },
}
