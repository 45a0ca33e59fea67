//! Single-consumer run loop with an idempotent shutdown hook.
//!
//! Items arrive through one bounded channel. Each frame is run through the
//! machine to completion, then the status step fires if a full cadence
//! interval has passed. End of stream or the cancel token both end the
//! loop, after which `shutdown` writes the final record and flushes the
//! message log. Calling `shutdown` again is a no-op.

use crate::sink::LogSink;
use crate::status::StatusBlock;
use chrono::{DateTime, Utc};
use qubox_core::{FeedItem, Result};
use qubox_engine::{BitSource, FrameOutcome, Machine, QuboxConfig, RateAnalyzer};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Totals at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub ack: u64,
    pub nul: u64,
    pub cycle: usize,
    pub reference_len: usize,
    pub ghost_counter: u64,
    pub binary: String,
}

pub struct Runner {
    machine: Machine,
    rates: RateAnalyzer,
    sink: LogSink,
    paradox_block: usize,
    max_extend: usize,
    console: bool,
    frames: u64,
    shut_down: bool,
}

impl Runner {
    /// Build the machine and open the log sink. Fails on invalid config.
    pub async fn new(
        config: &QuboxConfig,
        entropy: Box<dyn BitSource>,
        started_at: DateTime<Utc>,
    ) -> Result<Self> {
        let machine = Machine::new(config, entropy)?;
        let sink = LogSink::open(&config.status.log_path).await?;
        Ok(Self {
            machine,
            rates: RateAnalyzer::new(started_at, config.status_interval(), config.status.history_limit),
            sink,
            paradox_block: config.ghost.paradox_block,
            max_extend: config.ghost.max_extend,
            console: false,
            frames: 0,
            shut_down: false,
        })
    }

    /// Print the status block to stdout on every refresh.
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn rates(&self) -> &RateAnalyzer {
        &self.rates
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Consume `rx` until end of stream, cancellation or an error, then shut down.
    /// A processing error still gets the shutdown records; the original error is returned.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<FeedItem>, cancel: CancellationToken) -> Result<RunSummary> {
        let consumed = self.consume(&mut rx, &cancel).await;
        let closed = self.shutdown(Utc::now()).await;
        if let Err(e) = &consumed {
            error!("Run aborted after {} frames: {}", self.frames, e);
        }
        consumed?;
        closed?;
        Ok(self.summary())
    }

    async fn consume(&mut self, rx: &mut mpsc::Receiver<FeedItem>, cancel: &CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Stop signal received after {} frames", self.frames);
                    break;
                }
                item = rx.recv() => match item {
                    Some(item) => {
                        self.process(item, Utc::now()).await?;
                    }
                    None => {
                        info!("End of stream after {} frames", self.frames);
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    /// Apply one item at time `now`.
    pub async fn process(&mut self, item: FeedItem, now: DateTime<Utc>) -> Result<Option<FrameOutcome>> {
        if self.shut_down {
            warn!("Item received after shutdown; ignored");
            return Ok(None);
        }
        match item {
            FeedItem::Frame(frame) => {
                self.frames += 1;
                let outcome = self.machine.ingest(&frame, now);
                if let Some(activation) = &outcome.ghost_activation {
                    self.sink.append(&activation.log_record()).await?;
                }
                self.refresh_if_due(now).await?;
                Ok(Some(outcome))
            }
            FeedItem::ExtendReference { count } => {
                let count = if count == 0 { self.paradox_block } else { count };
                if count > self.max_extend {
                    warn!("Reference extension of {} exceeds ghost.max_extend {}; ignored", count, self.max_extend);
                    return Ok(None);
                }
                self.machine.extend_reference(count)?;
                Ok(None)
            }
        }
    }

    async fn refresh_if_due(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.rates.is_due(now) {
            return Ok(());
        }
        let block = self.sample(now);
        if self.console {
            println!("{}", block.render());
        }
        self.sink.append(&block.log_record()).await
    }

    fn sample(&mut self, now: DateTime<Utc>) -> StatusBlock {
        let state = self.machine.state();
        let rates = self.rates.sample(state.ack, state.nul, now);
        StatusBlock::new(now, self.machine.snapshot(), rates)
    }

    /// Final sample, flushed message log and binary output. Runs once.
    pub async fn shutdown(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let block = self.sample(now);
        self.sink.append(&format!("FINAL | {}", block.log_record())).await?;
        for msg in self.machine.messages_mut().drain() {
            self.sink.append(&format!("MSG | {msg}")).await?;
        }
        let binary = format!("BINARY | {}", self.machine.state().binary);
        self.sink.append(&binary).await?;
        self.sink.flush().await?;

        info!(
            frames = self.frames,
            ack = self.machine.state().ack,
            nul = self.machine.state().nul,
            "Shutdown complete, {} records in {}",
            self.sink.records(),
            self.sink.path().display()
        );
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        let state = self.machine.state();
        RunSummary {
            frames: self.frames,
            ack: state.ack,
            nul: state.nul,
            cycle: state.cycle,
            reference_len: self.machine.reference().len(),
            ghost_counter: self.machine.ghost().counter(),
            binary: state.binary.clone(),
        }
    }
}
