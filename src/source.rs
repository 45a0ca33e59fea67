//! Upstream frame sources and the producer task.
//!
//! A source yields complete [`FeedItem`]s. The producer drains it into a
//! bounded channel so the runner only ever sees whole frames, one at a time.
//!
//! Wire format: one JSON object per line.
//! - `{"cells": [[row, col], ...]}`: cells already past the sensitivity threshold
//! - `{"counts": [[n, ...], ...]}`: changed-pixel counts per cell, row-major
//! - `{"extend_reference": n}`: append `n` paradox symbols (0 = configured block)

use async_trait::async_trait;
use qubox_core::{Cell, Error, FeedItem, Frame, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Grid the upstream partitions each frame into.
pub const GRID_ROWS: usize = 8;
pub const GRID_COLS: usize = 16;

#[async_trait]
pub trait FrameSource: Send {
    /// Next item, or `None` at end of stream.
    async fn next_item(&mut self) -> Result<Option<FeedItem>>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedLine {
    Cells { cells: Vec<(u32, u32)> },
    Counts { counts: Vec<Vec<u32>> },
    Extend { extend_reference: usize },
}

/// Parse one input line. Cell activity from `counts` is thresholded at `sensitivity`.
pub fn parse_line(line: &str, sensitivity: u32) -> Result<FeedItem> {
    let parsed: FeedLine = serde_json::from_str(line)
        .map_err(|e| Error::invalid_frame(format!("{e}: {line}")))?;
    Ok(match parsed {
        FeedLine::Cells { cells } => FeedItem::Frame(Frame::new(cells.into_iter().map(Cell::from).collect())),
        FeedLine::Counts { counts } => FeedItem::Frame(Frame::from_counts(&counts, sensitivity)),
        FeedLine::Extend { extend_reference } => FeedItem::ExtendReference { count: extend_reference },
    })
}

/// JSON-lines reader over any async buffered input (stdin, file, in-memory).
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    sensitivity: u32,
    line_no: u64,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R, sensitivity: u32) -> Self {
        Self { lines: reader.lines(), sensitivity, line_no: 0 }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> FrameSource for JsonLinesSource<R> {
    async fn next_item(&mut self) -> Result<Option<FeedItem>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line, self.sensitivity) {
                Ok(item) => return Ok(Some(item)),
                Err(e) => warn!("Skipping input line {}: {}", self.line_no, e),
            }
        }
        Ok(None)
    }
}

/// Open `-` (stdin) or a file path as a JSON-lines source.
pub async fn open_input(path: &str, sensitivity: u32) -> Result<Box<dyn FrameSource>> {
    if path == "-" {
        let reader = BufReader::new(tokio::io::stdin());
        return Ok(Box::new(JsonLinesSource::new(reader, sensitivity)));
    }
    let file = tokio::fs::File::open(path).await?;
    info!("Reading frames from {}", path);
    Ok(Box::new(JsonLinesSource::new(BufReader::new(file), sensitivity)))
}

/// Random count grids standing in for a camera.
pub struct SyntheticSource {
    rng: StdRng,
    remaining: u64,
    sensitivity: u32,
    activity: f64,
    pace: Option<Duration>,
}

impl SyntheticSource {
    /// `frames` grids, each cell active with probability `activity`.
    pub fn new(frames: u64, sensitivity: u32, activity: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let activity = if activity.is_nan() { 0.0 } else { activity.clamp(0.0, 1.0) };
        Self { rng, remaining: frames, sensitivity, activity, pace: None }
    }

    /// Sleep between frames, e.g. 33ms for ~30 fps.
    pub fn paced(mut self, interval: Duration) -> Self {
        self.pace = Some(interval);
        self
    }

    fn next_counts(&mut self) -> Vec<Vec<u32>> {
        let busy_min = self.sensitivity.saturating_add(1);
        let busy_max = self.sensitivity.saturating_mul(2).max(busy_min);
        let mut grid = Vec::with_capacity(GRID_ROWS);
        for _ in 0..GRID_ROWS {
            let mut row = Vec::with_capacity(GRID_COLS);
            for _ in 0..GRID_COLS {
                let count = if self.rng.gen_bool(self.activity) {
                    self.rng.gen_range(busy_min..=busy_max)
                } else {
                    self.rng.gen_range(0..=self.sensitivity)
                };
                row.push(count);
            }
            grid.push(row);
        }
        grid
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_item(&mut self) -> Result<Option<FeedItem>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        if let Some(pace) = self.pace {
            tokio::time::sleep(pace).await;
        }
        let counts = self.next_counts();
        Ok(Some(FeedItem::Frame(Frame::from_counts(&counts, self.sensitivity))))
    }
}

/// Fixed list of items, for tests and replays.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    items: VecDeque<FeedItem>,
}

impl ScriptedSource {
    pub fn new(items: impl IntoIterator<Item = FeedItem>) -> Self {
        Self { items: items.into_iter().collect() }
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next_item(&mut self) -> Result<Option<FeedItem>> {
        Ok(self.items.pop_front())
    }
}

/// Drain `source` into `tx` until end of stream, a closed channel, or cancellation.
/// Dropping `tx` on return is the consumer's end-of-stream signal.
pub fn spawn_producer(
    mut source: Box<dyn FrameSource>,
    tx: mpsc::Sender<FeedItem>,
    cancel: CancellationToken,
) -> JoinHandle<Result<u64>> {
    tokio::spawn(async move {
        let mut sent = 0u64;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = source.next_item() => next?,
            };
            let Some(item) = next else {
                debug!("Source exhausted after {} items", sent);
                break;
            };
            if tx.send(item).await.is_err() {
                info!("Feed channel closed, producer stopping");
                break;
            }
            sent += 1;
        }
        Ok(sent)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cells_line() {
        let item = parse_line(r#"{"cells":[[5,6],[0,1]]}"#, 500).unwrap();
        assert_eq!(item, FeedItem::Frame(Frame::new(vec![Cell::new(5, 6), Cell::new(0, 1)])));
    }

    #[test]
    fn parse_counts_line_applies_sensitivity() {
        let item = parse_line(r#"{"counts":[[0,600],[500,501]]}"#, 500).unwrap();
        assert_eq!(item, FeedItem::Frame(Frame::new(vec![Cell::new(0, 1), Cell::new(1, 1)])));
    }

    #[test]
    fn parse_extend_line() {
        let item = parse_line(r#"{"extend_reference":500}"#, 500).unwrap();
        assert_eq!(item, FeedItem::ExtendReference { count: 500 });
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(parse_line("{}", 1), Err(Error::InvalidFrame(_))));
        assert!(parse_line("not json", 1).is_err());
        assert!(parse_line(r#"{"cells":[[1]]}"#, 1).is_err());
    }

    #[test]
    fn synthetic_grid_shape() {
        let mut s = SyntheticSource::new(1, 100, 0.5, Some(3));
        let counts = s.next_counts();
        assert_eq!(counts.len(), GRID_ROWS);
        assert!(counts.iter().all(|row| row.len() == GRID_COLS));
    }

    #[test]
    fn synthetic_full_activity_marks_every_cell() {
        let mut s = SyntheticSource::new(1, 100, 1.0, Some(3));
        let counts = s.next_counts();
        let frame = Frame::from_counts(&counts, 100);
        assert_eq!(frame.len(), GRID_ROWS * GRID_COLS);
    }

    #[tokio::test]
    async fn synthetic_nan_activity_is_idle() {
        let mut s = SyntheticSource::new(2, 100, f64::NAN, Some(3));
        while let Some(item) = s.next_item().await.unwrap() {
            assert_eq!(item, FeedItem::Frame(Frame::empty()));
        }
    }
}
