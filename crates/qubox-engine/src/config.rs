//! Engine configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists. Validated once at
//! construction; the engine never runs on an invalid config.

use qubox_core::{Error, Result, Symbol};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level qubox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuboxConfig {
    /// Seed for the resync/reference bit source. `None` uses the thread RNG.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Upstream cell activation.
    pub capture: CaptureConfig,
    /// OR/AND gate parameters.
    pub gates: GateConfig,
    /// Cycle and reference sequence parameters.
    pub cycle: CycleConfig,
    /// Ghost protocol parameters.
    pub ghost: GhostConfig,
    /// Status cadence, message log and sink.
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Changed-pixel count a cell must exceed to count as active.
    pub sensitivity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// A gate counter must be strictly greater than this to attempt a transition.
    pub corr_threshold: u64,
    /// Exclusive lower bound of the qualifying evidence band.
    pub band_low: u32,
    /// Exclusive upper bound of the qualifying evidence band.
    pub band_high: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Consecutive accepts before `qu` is resynced from the bit source.
    pub longcyc: u32,
    /// Length of the generated reference sequence.
    pub reference_len: usize,
    /// Explicit comma-separated reference ("0,1,0,1"). Overrides `reference_len`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostConfig {
    /// Upper bound of the prime counter.
    pub prime_threshold: u32,
    /// Scale applied to the ghost counter to get its reported value.
    pub range_multiplier: u64,
    /// Sentinels appended per reference extension when no count is given.
    pub paradox_block: usize,
    /// Largest single extension accepted from the feed.
    pub max_extend: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Status/rate refresh cadence in milliseconds.
    pub interval_ms: u64,
    /// OR runs at least this long emit "prolonged"/"ended" messages.
    pub or_duration_threshold_secs: f64,
    /// Capacity of the ghost message log.
    pub message_capacity: usize,
    /// Rate snapshots kept in the rolling history.
    pub history_limit: usize,
    /// Append-only status log.
    pub log_path: PathBuf,
}

// ============================================================
// Defaults
// ============================================================

impl Default for QuboxConfig {
    fn default() -> Self {
        Self {
            seed: None,
            capture: CaptureConfig::default(),
            gates: GateConfig::default(),
            cycle: CycleConfig::default(),
            ghost: GhostConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { sensitivity: 500 }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { corr_threshold: 3, band_low: 4, band_high: 11 }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self { longcyc: 3, reference_len: 100_000, reference_pattern: None }
    }
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self { prime_threshold: 3, range_multiplier: 10, paradox_block: 500, max_extend: 100_000 }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            or_duration_threshold_secs: 3.0,
            message_capacity: 4,
            history_limit: 1024,
            log_path: PathBuf::from("ack_stats.log"),
        }
    }
}

// ============================================================
// Loading & validation
// ============================================================

impl QuboxConfig {
    /// Load config from a TOML file. A missing file yields defaults.
    /// Unparsable TOML is `Error::Toml`; out-of-range values are `Error::Config`.
    pub fn load(path: &Path) -> Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content)?;
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.status.interval_ms == 0 {
            return Err(Error::config("status.interval_ms must be positive"));
        }
        if !self.status.or_duration_threshold_secs.is_finite()
            || self.status.or_duration_threshold_secs < 0.0
        {
            return Err(Error::config("status.or_duration_threshold_secs must be a non-negative number"));
        }
        if self.status.message_capacity == 0 {
            return Err(Error::config("status.message_capacity must be at least 1"));
        }
        if self.status.history_limit == 0 {
            return Err(Error::config("status.history_limit must be at least 1"));
        }
        if self.cycle.longcyc == 0 {
            return Err(Error::config("cycle.longcyc must be at least 1"));
        }
        if self.ghost.max_extend == 0 || self.ghost.paradox_block > self.ghost.max_extend {
            return Err(Error::config(format!(
                "ghost.paradox_block ({}) must be within ghost.max_extend ({})",
                self.ghost.paradox_block, self.ghost.max_extend
            )));
        }
        if self.gates.band_high <= self.gates.band_low.saturating_add(1) {
            return Err(Error::config(format!(
                "gates band ({}, {}) admits no value",
                self.gates.band_low, self.gates.band_high
            )));
        }
        match &self.cycle.reference_pattern {
            Some(pattern) => {
                parse_pattern(pattern)?;
            }
            None if self.cycle.reference_len == 0 => {
                return Err(Error::config("cycle.reference_len must be positive"));
            }
            None => {}
        }
        Ok(())
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status.interval_ms)
    }

    pub fn or_duration_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.status.or_duration_threshold_secs)
    }
}

/// Parse a comma-separated reference pattern. Empty or unknown tokens are errors.
pub fn parse_pattern(pattern: &str) -> Result<Vec<Symbol>> {
    let symbols = pattern
        .split(',')
        .map(|tok| {
            Symbol::parse(tok)
                .ok_or_else(|| Error::config(format!("invalid reference symbol {:?}", tok.trim())))
        })
        .collect::<Result<Vec<_>>>()?;
    if symbols.is_empty() {
        return Err(Error::config("reference pattern is empty"));
    }
    Ok(symbols)
}
