//! qubox — motion-gated binary state machine
//!
//! Usage:
//!   camera-feed | qubox                    → read JSON-lines frames from stdin
//!   qubox --input frames.jsonl             → replay a recorded feed
//!   qubox --synthetic 3000 --seed 7        → random 8x16 grids, no camera
//!   qubox --dump-config > qubox.toml       → write the default config

use clap::Parser;
use qubox::source::{self, FrameSource, SyntheticSource};
use qubox::Runner;
use qubox_engine::config::QuboxConfig;
use qubox_engine::entropy;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(
    name = "qubox",
    about = "Motion-gated binary state machine with ghost protocol escalation",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Path to config file (TOML). Missing file → defaults.
    #[arg(long, default_value = "qubox.toml")]
    config: String,

    /// Dump default config as TOML and exit.
    #[arg(long)]
    dump_config: bool,

    /// JSON-lines frame feed, or "-" for stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Generate this many random frames instead of reading input
    #[arg(long)]
    synthetic: Option<u64>,

    /// Probability a synthetic cell is active
    #[arg(long, default_value_t = 0.08)]
    activity: f64,

    /// Synthetic frame rate (0 = as fast as possible)
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Seed for resync and reference generation (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Gate threshold (overrides config)
    #[arg(long)]
    corr_threshold: Option<u64>,

    /// Accepts between resyncs (overrides config)
    #[arg(long)]
    longcyc: Option<u32>,

    /// Append-only status log (overrides config)
    #[arg(long)]
    log_path: Option<String>,

    /// Write tracing output to a file (in addition to stderr)
    #[arg(long)]
    trace_file: Option<String>,

    /// Don't print the status block on each refresh
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        println!("{}", QuboxConfig::default().to_toml());
        return Ok(());
    }

    let _guard = init_tracing(cli.trace_file.as_deref());
    anyhow::ensure!(
        (0.0..=1.0).contains(&cli.activity),
        "--activity must be a probability in [0, 1], got {}",
        cli.activity
    );

    let mut config = QuboxConfig::load(&expand_tilde(&cli.config))?;
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(corr) = cli.corr_threshold {
        config.gates.corr_threshold = corr;
    }
    if let Some(longcyc) = cli.longcyc {
        config.cycle.longcyc = longcyc;
    }
    if let Some(path) = &cli.log_path {
        config.status.log_path = expand_tilde(path);
    }
    config.validate()?;

    let mut runner = Runner::new(&config, entropy::from_seed(config.seed), chrono::Utc::now())
        .await?
        .with_console(!cli.quiet);

    let input: Box<dyn FrameSource> = match cli.synthetic {
        Some(frames) => {
            let mut synthetic = SyntheticSource::new(frames, config.capture.sensitivity, cli.activity, config.seed);
            if cli.fps > 0 {
                synthetic = synthetic.paced(Duration::from_secs_f64(1.0 / cli.fps as f64));
            }
            Box::new(synthetic)
        }
        None => source::open_input(&cli.input, config.capture.sensitivity).await?,
    };

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(64);
    let producer = source::spawn_producer(input, tx, cancel.clone());

    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    let summary = runner.run(rx, cancel.clone()).await?;
    cancel.cancel();

    match producer.await {
        Ok(Ok(sent)) => tracing::debug!("Producer sent {} items", sent),
        Ok(Err(e)) => tracing::error!("Acquisition failed: {}", e),
        Err(e) => tracing::error!("Producer task panicked: {}", e),
    }

    println!(
        "frames {}  ack {}  nul {}  cyc {}/{}  ghost #{}",
        summary.frames, summary.ack, summary.nul, summary.cycle, summary.reference_len, summary.ghost_counter
    );
    Ok(())
}

fn init_tracing(trace_file: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "qubox=info,qubox_engine=info".into())
    };
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let (file_layer, guard) = match trace_file {
        Some(path) => {
            let path = expand_tilde(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("qubox.trace"));
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(stderr).with(file_layer).init();
    guard
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
