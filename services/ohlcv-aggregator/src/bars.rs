//! OHLCV bar folding and the bar store
//!
//! A window's live trades are folded in arrival order: the first trade sets
//! `open`, the last sets `close`, and every trade extends `high`/`low` and
//! adds to `volume`. Closed bars live in a [`BarStore`] keyed by window end,
//! where late trades revise them in place.

use std::collections::BTreeMap;

use types::bar::Bar;
use types::ids::WindowKey;
use types::trade::Trade;

/// Fold the live trades of one window into a bar.
///
/// Arrival order is preserved (no re-sorting by timestamp). An empty window
/// yields [`Bar::empty`].
pub fn fold_window(window_label: impl Into<String>, trades: &[Trade]) -> Bar {
    let Some((first, rest)) = trades.split_first() else {
        return Bar::empty(window_label);
    };

    let mut bar = Bar::open_with(window_label, first.price, first.size);
    for trade in rest {
        bar.update(trade.price, trade.size);
    }
    bar
}

/// Closed bars keyed by window end (BTreeMap for chronological iteration).
#[derive(Debug, Default)]
pub struct BarStore {
    bars: BTreeMap<WindowKey, Bar>,
}

impl BarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the bar for a closed window. Returns the previous bar if the
    /// key was already present.
    pub fn insert(&mut self, key: WindowKey, bar: Bar) -> Option<Bar> {
        self.bars.insert(key, bar)
    }

    pub fn get(&self, key: WindowKey) -> Option<&Bar> {
        self.bars.get(&key)
    }

    /// Mutable access to a stored bar, for in-place revision.
    pub fn get_mut(&mut self, key: WindowKey) -> Option<&mut Bar> {
        self.bars.get_mut(&key)
    }

    /// Remove every bar whose key is at or before `key`. Returns how many
    /// were removed.
    pub fn evict_through(&mut self, key: WindowKey) -> usize {
        let keep = match key.as_nanos().checked_add(1) {
            Some(next) => self.bars.split_off(&WindowKey::from_nanos(next)),
            None => BTreeMap::new(),
        };
        let removed = self.bars.len();
        self.bars = keep;
        removed
    }

    /// All bars in chronological order.
    pub fn snapshot(&self) -> Vec<(WindowKey, Bar)> {
        self.bars
            .iter()
            .map(|(key, bar)| (*key, bar.clone()))
            .collect()
    }

    /// Most recent bars, newest first.
    pub fn recent(&self, limit: usize) -> Vec<(WindowKey, Bar)> {
        self.bars
            .iter()
            .rev()
            .take(limit)
            .map(|(key, bar)| (*key, bar.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use types::numeric::{Price, Size};

    fn trade(price: u64, size: u64, ts: i64) -> Trade {
        Trade::new(Price::from_u64(price), Size::from_u64(size), ts)
    }

    fn key(secs: i64) -> WindowKey {
        WindowKey::from_nanos(secs * 1_000_000_000)
    }

    #[test]
    fn test_fold_reference_window() {
        let trades = vec![
            trade(100, 1, 1),
            trade(105, 2, 2),
            trade(98, 1, 3),
            trade(110, 3, 4),
        ];
        let bar = fold_window("00:00:30", &trades);

        assert_eq!(bar.open, Decimal::from(100));
        assert_eq!(bar.close, Decimal::from(110));
        assert_eq!(bar.high, Decimal::from(110));
        assert_eq!(bar.low, Decimal::from(98));
        assert_eq!(bar.volume, Decimal::from(7));
        assert_eq!(bar.trade_count, 4);
        assert!(bar.is_valid());
    }

    #[test]
    fn test_fold_uses_arrival_order() {
        // later timestamp arrives first; it still sets open
        let trades = vec![trade(200, 1, 50), trade(100, 1, 10)];
        let bar = fold_window("00:00:30", &trades);

        assert_eq!(bar.open, Decimal::from(200));
        assert_eq!(bar.close, Decimal::from(100));
    }

    #[test]
    fn test_fold_empty_window() {
        let bar = fold_window("00:00:30", &[]);
        assert!(bar.is_empty());
        assert_eq!(bar.open, Decimal::ZERO);
        assert_eq!(bar.volume, Decimal::ZERO);
        assert_eq!(bar.window_label, "00:00:30");
    }

    #[test]
    fn test_store_insert_and_revise_in_place() {
        let mut store = BarStore::new();
        store.insert(key(30), fold_window("00:00:30", &[trade(100, 1, 1)]));

        store
            .get_mut(key(30))
            .unwrap()
            .revise(Price::from_u64(120), Size::from_u64(2));

        let bar = store.get(key(30)).unwrap();
        assert_eq!(bar.high, Decimal::from(120));
        assert_eq!(bar.volume, Decimal::from(3));
    }

    #[test]
    fn test_store_chronological_snapshot() {
        let mut store = BarStore::new();
        store.insert(key(90), Bar::empty("00:01:30"));
        store.insert(key(30), Bar::empty("00:00:30"));
        store.insert(key(60), Bar::empty("00:01:00"));

        let keys: Vec<i64> = store.snapshot().iter().map(|(k, _)| k.as_nanos()).collect();
        assert_eq!(keys, vec![key(30).as_nanos(), key(60).as_nanos(), key(90).as_nanos()]);

        let recent = store.recent(1);
        assert_eq!(recent[0].0, key(90));
    }

    #[test]
    fn test_store_evict_through() {
        let mut store = BarStore::new();
        for secs in [30, 60, 90, 120] {
            store.insert(key(secs), Bar::empty(""));
        }

        assert_eq!(store.evict_through(key(60)), 2);
        assert_eq!(store.len(), 2);
        assert!(store.get(key(60)).is_none());
        assert!(store.get(key(90)).is_some());
    }
}
