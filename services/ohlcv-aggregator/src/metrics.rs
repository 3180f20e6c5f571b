//! Observability counters for the aggregator
//!
//! Every trade that enters the pending buffer is accounted for exactly once
//! as current, late or discarded; the counters here make that checkable.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Core metrics for the aggregation service.
pub struct AggregatorMetrics {
    // Feed
    pub frames_received: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub decode_failures: AtomicU64,
    pub status_records: AtomicU64,

    // Trade accounting
    pub trades_appended: AtomicU64,
    pub trades_current: AtomicU64,
    pub trades_late: AtomicU64,
    pub trades_discarded: AtomicU64,
    pub late_unmatched: AtomicU64,

    // Output
    pub bars_emitted: AtomicU64,
    pub revisions_emitted: AtomicU64,
    pub tick_duration_ns: Mutex<LatencyTracker>,
}

impl AggregatorMetrics {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            status_records: AtomicU64::new(0),
            trades_appended: AtomicU64::new(0),
            trades_current: AtomicU64::new(0),
            trades_late: AtomicU64::new(0),
            trades_discarded: AtomicU64::new(0),
            late_unmatched: AtomicU64::new(0),
            bars_emitted: AtomicU64::new(0),
            revisions_emitted: AtomicU64::new(0),
            tick_duration_ns: Mutex::new(LatencyTracker::new(1000)),
        }
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status(&self) {
        self.status_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_appended(&self) {
        self.trades_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the classification result of one tick.
    pub fn record_classified(&self, current: u64, late: u64, discarded: u64) {
        self.trades_current.fetch_add(current, Ordering::Relaxed);
        self.trades_late.fetch_add(late, Ordering::Relaxed);
        self.trades_discarded.fetch_add(discarded, Ordering::Relaxed);
    }

    pub fn record_late_unmatched(&self) {
        self.late_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bar(&self) {
        self.bars_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revision(&self) {
        self.revisions_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self, duration_ns: u64) {
        if let Ok(mut tracker) = self.tick_duration_ns.lock() {
            tracker.record(duration_ns);
        }
    }

    /// Trades classified so far, across all ticks.
    pub fn trades_classified(&self) -> u64 {
        self.trades_current.load(Ordering::Relaxed)
            + self.trades_late.load(Ordering::Relaxed)
            + self.trades_discarded.load(Ordering::Relaxed)
    }

    /// p99 tick duration in nanoseconds, if any tick ran.
    pub fn tick_p99_ns(&self) -> Option<u64> {
        self.tick_duration_ns
            .lock()
            .ok()
            .and_then(|tracker| tracker.percentile(99))
    }

    /// Export counters as an ordered map.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("frames_received".to_string(), self.frames_received.load(Ordering::Relaxed));
        m.insert("frames_dropped".to_string(), self.frames_dropped.load(Ordering::Relaxed));
        m.insert("decode_failures".to_string(), self.decode_failures.load(Ordering::Relaxed));
        m.insert("status_records".to_string(), self.status_records.load(Ordering::Relaxed));
        m.insert("trades_appended".to_string(), self.trades_appended.load(Ordering::Relaxed));
        m.insert("trades_current".to_string(), self.trades_current.load(Ordering::Relaxed));
        m.insert("trades_late".to_string(), self.trades_late.load(Ordering::Relaxed));
        m.insert("trades_discarded".to_string(), self.trades_discarded.load(Ordering::Relaxed));
        m.insert("late_unmatched".to_string(), self.late_unmatched.load(Ordering::Relaxed));
        m.insert("bars_emitted".to_string(), self.bars_emitted.load(Ordering::Relaxed));
        m.insert("revisions_emitted".to_string(), self.revisions_emitted.load(Ordering::Relaxed));
        m
    }
}

impl Default for AggregatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    /// Number of samples recorded.
    pub fn count(&self) -> usize {
        self.samples.len()
    }
}
