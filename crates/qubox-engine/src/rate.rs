//! ACK/NUL rate statistics on a fixed wall-clock cadence.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RateSnapshot {
    pub acks_per_refresh: f64,
    pub acks_per_second: f64,
    pub total_acks: u64,
    pub ack_delta: u64,
    pub nuls_per_second: f64,
    pub total_nuls: u64,
    pub nul_delta: u64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone)]
pub struct RateAnalyzer {
    started_at: DateTime<Utc>,
    cadence: Duration,
    last_sample_at: DateTime<Utc>,
    last_ack: u64,
    last_nul: u64,
    last: Option<RateSnapshot>,
    history: VecDeque<RateSnapshot>,
    history_limit: usize,
}

impl RateAnalyzer {
    pub fn new(started_at: DateTime<Utc>, cadence: Duration, history_limit: usize) -> Self {
        Self {
            started_at,
            cadence,
            last_sample_at: started_at,
            last_ack: 0,
            last_nul: 0,
            last: None,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Non-blocking cadence check: has a full interval passed since the last sample?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        seconds_between(self.last_sample_at, now) >= self.cadence.as_secs_f64()
    }

    /// Seconds since the analyzer started, clamped at zero.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        seconds_between(self.started_at, now)
    }

    /// Compute a snapshot against the process start, then record it.
    pub fn sample(&mut self, ack: u64, nul: u64, now: DateTime<Utc>) -> RateSnapshot {
        let elapsed = self.elapsed_secs(now);
        let ack_delta = ack.saturating_sub(self.last_ack);
        let nul_delta = nul.saturating_sub(self.last_nul);

        let refreshes = elapsed / self.cadence.as_secs_f64();
        let acks_per_refresh = if refreshes > 0.0 { ack_delta as f64 / refreshes } else { 0.0 };
        let acks_per_second = if elapsed > 0.0 { ack_delta as f64 / elapsed } else { 0.0 };
        let nuls_per_second = if elapsed > 0.0 { nul_delta as f64 / elapsed } else { 0.0 };

        let snapshot = RateSnapshot {
            acks_per_refresh: round2(acks_per_refresh),
            acks_per_second: round2(acks_per_second),
            total_acks: ack,
            ack_delta,
            nuls_per_second: round2(nuls_per_second),
            total_nuls: nul,
            nul_delta,
            elapsed_secs: round2(elapsed),
        };

        self.last_ack = ack;
        self.last_nul = nul;
        self.last_sample_at = now;
        self.last = Some(snapshot);
        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
        snapshot
    }

    pub fn last(&self) -> Option<RateSnapshot> {
        self.last
    }

    pub fn history(&self) -> impl Iterator<Item = &RateSnapshot> {
        self.history.iter()
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).to_std().map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::milliseconds(ms)
    }

    #[test]
    fn hundred_acks_over_two_seconds() {
        let mut r = RateAnalyzer::new(t0(), Duration::from_millis(500), 16);
        let s = r.sample(100, 0, at_ms(2000));
        assert_eq!(s.acks_per_second, 50.0);
        assert_eq!(s.acks_per_refresh, 25.0);
        assert_eq!(s.ack_delta, 100);
        assert_eq!(s.elapsed_secs, 2.0);
    }

    #[test]
    fn zero_elapsed_is_zero_rate() {
        let mut r = RateAnalyzer::new(t0(), Duration::from_millis(500), 16);
        let s = r.sample(10, 3, t0());
        assert_eq!(s.acks_per_second, 0.0);
        assert_eq!(s.acks_per_refresh, 0.0);
        assert_eq!(s.nuls_per_second, 0.0);
    }

    #[test]
    fn delta_is_since_last_sample() {
        let mut r = RateAnalyzer::new(t0(), Duration::from_millis(500), 16);
        r.sample(10, 0, at_ms(1000));
        let s = r.sample(30, 0, at_ms(4000));
        assert_eq!(s.ack_delta, 20);
        assert_eq!(s.acks_per_second, 5.0);
    }

    #[test]
    fn rounds_to_two_places() {
        let mut r = RateAnalyzer::new(t0(), Duration::from_millis(500), 16);
        let s = r.sample(1, 0, at_ms(3000));
        assert_eq!(s.acks_per_second, 0.33);
        assert_eq!(s.acks_per_refresh, 0.17);
    }

    #[test]
    fn due_after_full_interval() {
        let mut r = RateAnalyzer::new(t0(), Duration::from_millis(500), 16);
        assert!(!r.is_due(at_ms(499)));
        assert!(r.is_due(at_ms(500)));
        r.sample(0, 0, at_ms(600));
        assert!(!r.is_due(at_ms(1000)));
        assert!(r.is_due(at_ms(1100)));
    }

    #[test]
    fn clock_going_backwards_clamps() {
        let r = RateAnalyzer::new(at_ms(1000), Duration::from_millis(500), 16);
        assert_eq!(r.elapsed_secs(t0()), 0.0);
        assert!(!r.is_due(t0()));
    }

    #[test]
    fn history_is_bounded() {
        let mut r = RateAnalyzer::new(t0(), Duration::from_millis(500), 2);
        for i in 1..=5 {
            r.sample(i, 0, at_ms(i as i64 * 500));
        }
        let totals: Vec<u64> = r.history().map(|s| s.total_acks).collect();
        assert_eq!(totals, vec![4, 5]);
        assert_eq!(r.last().map(|s| s.total_acks), Some(5));
    }
}
