//! Keystroke tracing: counters, report histories and the `Shift+Shift+D` dump.
//!
//! # How a lost keystroke is located (for beginners)
//!
//! Executor U stamps each received report with a number from
//! `Counters::received` before queueing it.  If the upstream queue overflows,
//! the evicted report never reaches executor D and its number is missing
//! from the received history.  Executor D takes a number from
//! `Counters::sent` for every submission attempt; a refused submission leaves
//! a hole in the sent history.  [`Diagnostics::dump`] prints both histories
//! side by side and lists every hole.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hidproxy_core::domain::{DeviceStatus, KeyboardReport};
use hidproxy_core::protocol::sequence::sequence_gap;
use hidproxy_core::protocol::SequenceCounter;
use tracing::info;

/// Entries kept in each history.
pub const RING_CAPACITY: usize = 256;

/// Counters shared by both executors.
#[derive(Debug, Default)]
pub struct Counters {
    pub received: SequenceCounter,
    pub sent: SequenceCounter,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingEntry {
    pub seq: u32,
    /// Milliseconds since boot.
    pub at_ms: u64,
    pub report: KeyboardReport,
}

/// A missing run of sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    /// Last number seen before the hole.
    pub after: u32,
    pub missing: u32,
}

/// Fixed-size history of keyboard reports, oldest first.
#[derive(Debug)]
pub struct ReportRing {
    entries: VecDeque<RingEntry>,
    capacity: usize,
}

impl ReportRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: RingEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &RingEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Holes between consecutive entries.
    pub fn gaps(&self) -> Vec<Gap> {
        self.entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .filter_map(|(a, b)| match sequence_gap(a.seq, b.seq) {
                0 | 1 => None,
                d => Some(Gap {
                    after: a.seq,
                    missing: d - 1,
                }),
            })
            .collect()
    }
}

/// Figures for one status line.
#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot {
    pub status: DeviceStatus,
    pub upstream_dropped: u64,
    pub upstream_depth: usize,
    pub downstream_depth: usize,
    pub macros: usize,
}

/// Executor D's diagnostic state.
#[derive(Debug)]
pub struct Diagnostics {
    counters: Arc<Counters>,
    received: ReportRing,
    sent: ReportRing,
    epoch: Instant,
    status_interval: Option<Duration>,
    last_status: Instant,
}

impl Diagnostics {
    pub fn new(counters: Arc<Counters>, status_interval: Option<Duration>, now: Instant) -> Self {
        Self {
            counters,
            received: ReportRing::new(RING_CAPACITY),
            sent: ReportRing::new(RING_CAPACITY),
            epoch: now,
            status_interval,
            last_status: now,
        }
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    fn millis(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_millis() as u64
    }

    pub fn uptime(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.epoch)
    }

    /// Records a keyboard report taken off the upstream queue.
    pub fn record_received(&mut self, seq: u32, report: KeyboardReport, now: Instant) {
        let at_ms = self.millis(now);
        self.received.push(RingEntry { seq, at_ms, report });
    }

    /// Records a keyboard report accepted by the host.
    pub fn record_sent(&mut self, report: KeyboardReport, now: Instant) {
        let seq = self.counters.sent.next();
        let at_ms = self.millis(now);
        self.sent.push(RingEntry { seq, at_ms, report });
    }

    /// Burns a sent number for a refused submission.
    pub fn record_refused(&self) {
        self.counters.sent.next();
    }

    pub fn received_ring(&self) -> &ReportRing {
        &self.received
    }

    pub fn sent_ring(&self) -> &ReportRing {
        &self.sent
    }

    pub fn status_line(&self, snap: &StatusSnapshot) -> String {
        format!(
            "status={} received={} sent={} dropped={} upstream_q={} downstream_q={} macros={}",
            snap.status,
            self.counters.received.current(),
            self.counters.sent.current(),
            snap.upstream_dropped,
            snap.upstream_depth,
            snap.downstream_depth,
            snap.macros,
        )
    }

    /// Logs the status line once per interval.
    pub fn maybe_log_status(&mut self, now: Instant, snap: impl FnOnce() -> StatusSnapshot) {
        let Some(interval) = self.status_interval else {
            return;
        };
        if now.saturating_duration_since(self.last_status) >= interval {
            self.last_status = now;
            info!("{}", self.status_line(&snap()));
        }
    }

    /// Both histories side by side, followed by the gap analysis.
    pub fn dump(&self, upstream_dropped: u64) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>8} {:>10} {:<25} | {:>8} {:>10} {:<25}",
            "rx seq", "rx ms", "received", "tx seq", "tx ms", "sent"
        );
        let rows = self.received.len().max(self.sent.len());
        let mut rx = self.received.entries();
        let mut tx = self.sent.entries();
        for _ in 0..rows {
            let left = rx
                .next()
                .map(|e| format!("{:>8} {:>10} {:<25}", e.seq, e.at_ms, e.report.to_string()))
                .unwrap_or_else(|| format!("{:46}", ""));
            let right = tx
                .next()
                .map(|e| format!("{:>8} {:>10} {:<25}", e.seq, e.at_ms, e.report.to_string()))
                .unwrap_or_default();
            let _ = writeln!(out, "{left} | {right}");
        }

        let rx_gaps = self.received.gaps();
        let tx_gaps = self.sent.gaps();
        let _ = writeln!(
            out,
            "upstream drops counted: {upstream_dropped}; receive gaps: {}; send gaps: {}",
            rx_gaps.len(),
            tx_gaps.len()
        );
        for g in rx_gaps {
            let _ = writeln!(out, "  lost before queue: {} after rx #{}", g.missing, g.after);
        }
        for g in tx_gaps {
            let _ = writeln!(out, "  refused by host: {} after tx #{}", g.missing, g.after);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: u32) -> RingEntry {
        RingEntry {
            seq,
            at_ms: u64::from(seq),
            report: KeyboardReport::key(0, 4),
        }
    }

    #[test]
    fn test_ring_keeps_newest_entries() {
        // Arrange
        let mut ring = ReportRing::new(3);

        // Act
        for seq in 0..5 {
            ring.push(entry(seq));
        }

        // Assert
        let seqs: Vec<u32> = ring.entries().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn test_gaps_report_missing_numbers() {
        let mut ring = ReportRing::new(8);
        for seq in [1, 2, 5, 6, 8] {
            ring.push(entry(seq));
        }
        assert_eq!(
            ring.gaps(),
            vec![Gap { after: 2, missing: 2 }, Gap { after: 6, missing: 1 }]
        );
    }

    #[test]
    fn test_gaps_across_wraparound() {
        let mut ring = ReportRing::new(4);
        ring.push(entry(u32::MAX));
        ring.push(entry(0));
        assert!(ring.gaps().is_empty());
    }

    #[test]
    fn test_refusal_shows_as_send_gap() {
        // Arrange
        let t0 = Instant::now();
        let mut diag = Diagnostics::new(Counters::new(), None, t0);

        // Act
        diag.record_sent(KeyboardReport::key(0, 4), t0);
        diag.record_refused();
        diag.record_sent(KeyboardReport::RELEASE_ALL, t0);

        // Assert
        assert_eq!(diag.sent_ring().gaps(), vec![Gap { after: 0, missing: 1 }]);
        let dump = diag.dump(0);
        assert!(dump.contains("refused by host: 1 after tx #0"), "{dump}");
    }

    #[test]
    fn test_dump_lists_received_gaps() {
        let t0 = Instant::now();
        let mut diag = Diagnostics::new(Counters::new(), None, t0);
        diag.record_received(0, KeyboardReport::key(0, 4), t0);
        diag.record_received(3, KeyboardReport::key(0, 5), t0);

        let dump = diag.dump(2);

        assert!(dump.contains("upstream drops counted: 2"));
        assert!(dump.contains("lost before queue: 2 after rx #0"));
    }

    #[test]
    fn test_status_line_mentions_counters() {
        let t0 = Instant::now();
        let counters = Counters::new();
        counters.received.next();
        let diag = Diagnostics::new(counters, Some(Duration::from_secs(5)), t0);
        let line = diag.status_line(&StatusSnapshot {
            status: DeviceStatus::Sealed,
            upstream_dropped: 0,
            upstream_depth: 0,
            downstream_depth: 3,
            macros: 2,
        });
        assert!(line.contains("status=sealed"));
        assert!(line.contains("received=1"));
        assert!(line.contains("downstream_q=3"));
    }
}
