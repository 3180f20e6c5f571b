//! Window scheduler
//!
//! On every tick the scheduler closes one window. With `K` the window end,
//! `cutoff = K - window` and `stale_cutoff = cutoff - stale_window`, each
//! buffered trade with timestamp `t` is:
//!
//! - discarded when `t < stale_cutoff`,
//! - reconciled into an older bar when `stale_cutoff <= t < cutoff`,
//! - folded into the new bar when `t >= cutoff`.
//!
//! The pending buffer stays locked from drain through fold; the bar store is
//! locked for reconciliation and insertion. Lock order is buffer, then store.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use types::bar::Bar;
use types::ids::WindowKey;
use types::trade::Trade;

use crate::bars::{fold_window, BarStore};
use crate::ingestion::PendingBuffer;
use crate::metrics::AggregatorMetrics;
use crate::reconcile::{Reconciler, Reconciliation};
use crate::sink::{BarReport, BarSink, ReportKind};
use crate::window::{unix_now_nanos, WindowGrid};

/// Bar store shared between the scheduler and readers.
pub type SharedBarStore = Arc<Mutex<BarStore>>;

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub key: WindowKey,
    pub bar: Bar,
    pub current: usize,
    pub late: usize,
    pub discarded: usize,
    /// Late trades that found a bar to revise.
    pub revised: usize,
    /// Bars dropped by stale eviction.
    pub evicted: usize,
}

/// Drives window closes, reconciliation and reporting.
pub struct WindowScheduler {
    grid: WindowGrid,
    stale_window: i64,
    evict_stale_bars: bool,
    buffer: Arc<PendingBuffer>,
    store: SharedBarStore,
    reconciler: Reconciler,
    sink: Arc<dyn BarSink>,
    metrics: Arc<AggregatorMetrics>,
}

impl WindowScheduler {
    pub fn new(
        grid: WindowGrid,
        stale_window: Duration,
        buffer: Arc<PendingBuffer>,
        store: SharedBarStore,
        sink: Arc<dyn BarSink>,
        metrics: Arc<AggregatorMetrics>,
    ) -> Self {
        Self {
            grid,
            stale_window: i64::try_from(stale_window.as_nanos()).unwrap_or(i64::MAX),
            evict_stale_bars: false,
            buffer,
            store,
            reconciler: Reconciler::new(grid),
            sink,
            metrics,
        }
    }

    /// Remove bars no late trade can reach after each tick.
    pub fn with_stale_eviction(mut self, enabled: bool) -> Self {
        self.evict_stale_bars = enabled;
        self
    }

    pub fn grid(&self) -> WindowGrid {
        self.grid
    }

    /// Close the window ending at `key`.
    pub fn tick_at(&self, key: WindowKey) -> TickOutcome {
        let started = Instant::now();
        let cutoff = self.grid.cutoff(key);
        let stale_cutoff = cutoff.saturating_sub(self.stale_window);

        // Drain, classify and fold while appends are held off.
        let (bar, late, current, discarded) = {
            let mut pending = self.buffer.lock();
            let drained = std::mem::take(&mut *pending);

            let mut current = Vec::with_capacity(drained.len());
            let mut late = Vec::new();
            let mut discarded = 0usize;

            for trade in drained {
                let ts = trade.timestamp_nanos();
                if ts < stale_cutoff {
                    debug!(
                        timestamp = trade.timestamp_millis,
                        price = %trade.price,
                        "Discarding stale trade"
                    );
                    discarded += 1;
                } else if ts < cutoff {
                    late.push(trade);
                } else {
                    current.push(trade);
                }
            }

            let bar = fold_window(key.label(), &current);
            (bar, late, current.len(), discarded)
        };

        if bar.volume_saturated() {
            warn!(window = %key, "Bar volume saturated at decimal maximum");
        }

        let late_count = late.len();
        let (revisions, evicted) = {
            let mut store = self.lock_store();
            let revisions = self.reconcile_all(&late, &mut store);
            store.insert(key, bar.clone());
            let evicted = if self.evict_stale_bars {
                // keys at or before the stale cutoff are unreachable by any later tick
                store.evict_through(WindowKey::from_nanos(stale_cutoff))
            } else {
                0
            };
            (revisions, evicted)
        };

        self.metrics
            .record_classified(current as u64, late_count as u64, discarded as u64);

        for (revised_key, revised_bar) in &revisions {
            self.metrics.record_revision();
            self.sink.emit(&BarReport {
                key: *revised_key,
                bar: revised_bar.clone(),
                trade_count: 1,
                kind: ReportKind::Revision,
            });
        }

        self.metrics.record_bar();
        self.sink.emit(&BarReport {
            key,
            bar: bar.clone(),
            trade_count: current as u64,
            kind: ReportKind::Fresh,
        });

        let elapsed = started.elapsed();
        self.metrics
            .record_tick(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX));
        if elapsed.as_nanos() > (self.grid.window_nanos() / 2) as u128 {
            warn!(
                window = %key,
                elapsed_ms = elapsed.as_millis() as u64,
                "Tick took more than half a window"
            );
        }

        debug!(
            window = %key,
            current,
            late = late_count,
            discarded,
            revised = revisions.len(),
            evicted,
            "Tick complete"
        );

        TickOutcome {
            key,
            bar,
            current,
            late: late_count,
            discarded,
            revised: revisions.len(),
            evicted,
        }
    }

    /// Tick on the window grid until `shutdown` fires, then emit and return
    /// the final dump of the store.
    ///
    /// The first tick fires at the end of the window containing "now". A
    /// tick in progress when shutdown arrives is completed first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Vec<(WindowKey, Bar)> {
        let mut key = self.grid.key_for(unix_now_nanos());
        let delay = key.as_nanos().saturating_sub(unix_now_nanos()).max(0) as u64;
        let period = Duration::from_nanos(self.grid.window_nanos() as u64);

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + Duration::from_nanos(delay),
            period,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        info!(
            first_window = %key,
            window_ms = period.as_millis() as u64,
            "Window scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.tick_at(key);
                    key = self.grid.next_key(key);
                }
            }
        }

        self.finish()
    }

    /// Emit the final dump and return it.
    pub fn finish(self) -> Vec<(WindowKey, Bar)> {
        let bars = self.lock_store().snapshot();
        info!(bars = bars.len(), "Window scheduler stopped");
        self.sink.final_dump(&bars);
        bars
    }

    fn reconcile_all(&self, late: &[Trade], store: &mut BarStore) -> Vec<(WindowKey, Bar)> {
        let mut revisions = Vec::with_capacity(late.len());
        for trade in late {
            debug!(
                timestamp = trade.timestamp_millis,
                price = %trade.price,
                "Late trade"
            );
            match self
                .reconciler
                .reconcile(trade.timestamp_nanos(), trade, store)
            {
                Reconciliation::Revised { key, bar } => {
                    if bar.volume_saturated() {
                        warn!(window = %key, "Revised bar volume saturated at decimal maximum");
                    }
                    revisions.push((key, bar));
                }
                Reconciliation::Unmatched { .. } => self.metrics.record_late_unmatched(),
            }
        }
        revisions
    }

    fn lock_store(&self) -> MutexGuard<'_, BarStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use rust_decimal::Decimal;
    use types::numeric::{Price, Size};

    const SEC: i64 = 1_000_000_000;
    const ANCHOR: i64 = 1_708_123_200 * SEC;

    struct Harness {
        scheduler: WindowScheduler,
        buffer: Arc<PendingBuffer>,
        store: SharedBarStore,
        sink: Arc<RecordingSink>,
        metrics: Arc<AggregatorMetrics>,
    }

    fn harness() -> Harness {
        let grid = WindowGrid::new(ANCHOR, Duration::from_secs(30));
        let buffer = Arc::new(PendingBuffer::new());
        let store: SharedBarStore = Arc::new(Mutex::new(BarStore::new()));
        let sink = Arc::new(RecordingSink::new());
        let metrics = Arc::new(AggregatorMetrics::new());
        let scheduler = WindowScheduler::new(
            grid,
            Duration::from_secs(3600),
            Arc::clone(&buffer),
            Arc::clone(&store),
            sink.clone(),
            Arc::clone(&metrics),
        );
        Harness {
            scheduler,
            buffer,
            store,
            sink,
            metrics,
        }
    }

    /// Trade at `offset_secs` seconds after the anchor.
    fn trade(price: u64, size: u64, offset_secs: i64) -> Trade {
        let ts_millis = (ANCHOR + offset_secs * SEC) / 1_000_000;
        Trade::new(Price::from_u64(price), Size::from_u64(size), ts_millis)
    }

    #[test]
    fn test_tick_folds_current_window() {
        let h = harness();
        for (price, size, at) in [(100, 1, 1), (105, 2, 5), (98, 1, 12), (110, 3, 29)] {
            h.buffer.append(trade(price, size, at)).unwrap();
        }

        let key = h.scheduler.grid().first_key();
        let outcome = h.scheduler.tick_at(key);

        assert_eq!(outcome.current, 4);
        assert_eq!(outcome.late, 0);
        assert_eq!(outcome.bar.open, Decimal::from(100));
        assert_eq!(outcome.bar.close, Decimal::from(110));
        assert_eq!(outcome.bar.high, Decimal::from(110));
        assert_eq!(outcome.bar.low, Decimal::from(98));
        assert_eq!(outcome.bar.volume, Decimal::from(7));
        assert!(h.buffer.is_empty());

        let fresh = h.sink.fresh();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].trade_count, 4);
        assert_eq!(fresh[0].key, key);
        assert!(h.store.lock().unwrap().get(key).is_some());
    }

    #[test]
    fn test_empty_tick_emits_zero_bar() {
        let h = harness();
        let outcome = h.scheduler.tick_at(h.scheduler.grid().first_key());

        assert_eq!(outcome.current, 0);
        assert!(outcome.bar.is_empty());
        assert_eq!(outcome.bar.volume, Decimal::ZERO);
        assert_eq!(h.sink.fresh().len(), 1);
    }

    #[test]
    fn test_late_trade_revises_closed_bar() {
        let h = harness();
        let grid = h.scheduler.grid();
        let first = grid.first_key();

        h.buffer.append(trade(100, 1, 2)).unwrap();
        h.buffer.append(trade(110, 1, 20)).unwrap();
        h.scheduler.tick_at(first);

        // arrives during the second window, executed in the first
        h.buffer.append(trade(120, 2, 10)).unwrap();
        h.buffer.append(trade(104, 1, 40)).unwrap();
        let outcome = h.scheduler.tick_at(grid.next_key(first));

        assert_eq!(outcome.current, 1);
        assert_eq!(outcome.late, 1);
        assert_eq!(outcome.revised, 1);

        let store = h.store.lock().unwrap();
        let revised = store.get(first).unwrap();
        assert_eq!(revised.high, Decimal::from(120));
        assert_eq!(revised.close, Decimal::from(110));
        assert_eq!(revised.volume, Decimal::from(4));

        let revisions = h.sink.revisions();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].key, first);
        assert_eq!(revisions[0].bar.high, Decimal::from(120));
    }

    #[test]
    fn test_stale_trade_discarded() {
        let h = harness();
        let grid = h.scheduler.grid();
        let key = grid.first_key();

        // cutoff is the anchor; stale cutoff one hour before
        h.buffer.append(trade(999, 5, -3601)).unwrap();
        let outcome = h.scheduler.tick_at(key);

        assert_eq!(outcome.discarded, 1);
        assert_eq!(outcome.late, 0);
        assert!(outcome.bar.is_empty());
        assert!(h.sink.revisions().is_empty());
        assert_eq!(h.metrics.export()["trades_discarded"], 1);
    }

    #[test]
    fn test_late_without_bar_is_noop() {
        let h = harness();
        let grid = h.scheduler.grid();
        let second = grid.next_key(grid.first_key());

        // executed in the first window, which was never closed
        h.buffer.append(trade(120, 1, 10)).unwrap();
        let outcome = h.scheduler.tick_at(second);

        assert_eq!(outcome.late, 1);
        assert_eq!(outcome.revised, 0);
        assert_eq!(h.metrics.export()["late_unmatched"], 1);
        assert_eq!(h.store.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stale_eviction() {
        let grid = WindowGrid::new(ANCHOR, Duration::from_secs(30));
        let buffer = Arc::new(PendingBuffer::new());
        let store: SharedBarStore = Arc::new(Mutex::new(BarStore::new()));
        let scheduler = WindowScheduler::new(
            grid,
            Duration::from_secs(60),
            buffer,
            Arc::clone(&store),
            Arc::new(RecordingSink::new()),
            Arc::new(AggregatorMetrics::new()),
        )
        .with_stale_eviction(true);

        let mut key = grid.first_key();
        for _ in 0..5 {
            scheduler.tick_at(key);
            key = grid.next_key(key);
        }

        // last tick at anchor+150s: stale cutoff anchor+60s, keeps 90..150
        let keys: Vec<i64> = store
            .lock()
            .unwrap()
            .snapshot()
            .iter()
            .map(|(k, _)| (k.as_nanos() - ANCHOR) / SEC)
            .collect();
        assert_eq!(keys, vec![90, 120, 150]);
    }

    #[test]
    fn test_finish_dumps_store() {
        let h = harness();
        let grid = h.scheduler.grid();
        h.scheduler.tick_at(grid.first_key());
        h.scheduler.tick_at(grid.next_key(grid.first_key()));

        let dump = h.scheduler.finish();
        assert_eq!(dump.len(), 2);
        assert_eq!(h.sink.final_bars(), Some(dump));
    }
}
