//! Status block: console rendering and the delimited log record.

use chrono::{DateTime, Utc};
use qubox_engine::{MachineSnapshot, RateSnapshot};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StatusBlock {
    pub at: DateTime<Utc>,
    pub machine: MachineSnapshot,
    pub rates: RateSnapshot,
}

impl StatusBlock {
    pub fn new(at: DateTime<Utc>, machine: MachineSnapshot, rates: RateSnapshot) -> Self {
        Self { at, machine, rates }
    }

    /// Multi-line block for the console.
    pub fn render(&self) -> String {
        let m = &self.machine;
        let r = &self.rates;
        let mut out = format!("── qubox ── {:.2}s elapsed ──\n", r.elapsed_secs);
        out.push_str(&format!(
            "ACK {:>8}  {:>7.2}/s  {:>7.2}/refresh\n",
            m.ack, r.acks_per_second, r.acks_per_refresh
        ));
        out.push_str(&format!("NUL {:>8}  {:>7.2}/s\n", m.nul, r.nuls_per_second));
        out.push_str(&format!(
            "qu {}   cyc {}/{}{}   swi {}/{}\n",
            m.qu,
            m.cycle,
            m.reference_len,
            if m.exhausted { " (exhausted)" } else { "" },
            m.switches,
            m.longcyc
        ));
        out.push_str(&format!(
            "OR {}/{}   AND {}/{}   prime {}/{}\n",
            m.gates.or_count, m.corr_threshold, m.gates.and_count, m.corr_threshold, m.prime, m.prime_threshold
        ));
        out.push_str(&format!("ghost {} (#{})\n", m.ghost_value, m.ghost_counter));
        if !m.messages.is_empty() {
            out.push_str("messages:\n");
            for msg in &m.messages {
                out.push_str(&format!("  {msg}\n"));
            }
        }
        out
    }

    /// One `" | "`-delimited `key=value` line; field order is stable.
    pub fn log_record(&self) -> String {
        let m = &self.machine;
        let r = &self.rates;
        [
            self.at.format("%Y-%m-%d %H:%M:%S").to_string(),
            format!("elapsed={:.2}", r.elapsed_secs),
            format!("ack={}", m.ack),
            format!("nul={}", m.nul),
            format!("acks_per_second={:.2}", r.acks_per_second),
            format!("acks_per_refresh={:.2}", r.acks_per_refresh),
            format!("nuls_per_second={:.2}", r.nuls_per_second),
            format!("qu={}", m.qu),
            format!("cyc={}/{}", m.cycle, m.reference_len),
            format!("swi={}/{}", m.switches, m.longcyc),
            format!("or={}/{}", m.gates.or_count, m.corr_threshold),
            format!("and={}/{}", m.gates.and_count, m.corr_threshold),
            format!("prime={}/{}", m.prime, m.prime_threshold),
            format!("ghost={}", m.ghost_value),
            format!("messages={}", m.messages.join("; ")),
        ]
        .join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use qubox_core::Bit;
    use qubox_engine::gate::GateCounters;

    fn block() -> StatusBlock {
        let machine = MachineSnapshot {
            qu: Bit::One,
            cycle: 12,
            reference_len: 100,
            switches: 2,
            longcyc: 3,
            gates: GateCounters { or_count: 1, and_count: 2 },
            corr_threshold: 3,
            prime: 2,
            prime_threshold: 3,
            ghost_counter: 5,
            ghost_value: 50,
            ack: 7,
            nul: 5,
            binary_len: 12,
            exhausted: false,
            messages: vec!["OR state initiated at 10:00:00".into(), "Protocol state: 50".into()],
        };
        let rates = RateSnapshot {
            acks_per_refresh: 0.5,
            acks_per_second: 1.0,
            total_acks: 7,
            ack_delta: 2,
            nuls_per_second: 0.25,
            total_nuls: 5,
            nul_delta: 1,
            elapsed_secs: 2.0,
        };
        StatusBlock::new(Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 2).unwrap(), machine, rates)
    }

    #[test]
    fn log_record_is_stable() {
        assert_eq!(
            block().log_record(),
            "2026-01-02 10:00:02 | elapsed=2.00 | ack=7 | nul=5 | acks_per_second=1.00 | \
             acks_per_refresh=0.50 | nuls_per_second=0.25 | qu=1 | cyc=12/100 | swi=2/3 | \
             or=1/3 | and=2/3 | prime=2/3 | ghost=50 | \
             messages=OR state initiated at 10:00:00; Protocol state: 50"
        );
    }

    #[test]
    fn render_lists_messages() {
        let text = block().render();
        assert!(text.contains("cyc 12/100"));
        assert!(text.contains("swi 2/3"));
        assert!(text.contains("ghost 50 (#5)"));
        assert!(text.contains("  Protocol state: 50\n"));
        assert!(!text.contains("exhausted"));
    }
}
