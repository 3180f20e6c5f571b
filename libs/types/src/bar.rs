//! OHLCV bar for one aggregation window
//!
//! A bar is created when its window closes. `open` and `close` come from the
//! live trades folded at that moment and are never touched again; `high`,
//! `low` and `volume` may later be revised by late trades.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::numeric::{Price, Size};

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub window_label: String,
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
    /// Live trades folded when the window closed.
    pub trade_count: u64,
    /// Late trades reconciled into the bar afterwards.
    pub revision_count: u64,
}

impl Bar {
    /// Bar for a window that closed with no live trades.
    pub fn empty(window_label: impl Into<String>) -> Self {
        Self {
            window_label: window_label.into(),
            open: Decimal::ZERO,
            close: Decimal::ZERO,
            high: Decimal::ZERO,
            low: Decimal::ZERO,
            volume: Decimal::ZERO,
            trade_count: 0,
            revision_count: 0,
        }
    }

    /// Start a bar from the first live trade of the window.
    pub fn open_with(window_label: impl Into<String>, price: Price, size: Size) -> Self {
        let price = price.as_decimal();
        Self {
            window_label: window_label.into(),
            open: price,
            close: price,
            high: price,
            low: price,
            volume: size.as_decimal(),
            trade_count: 1,
            revision_count: 0,
        }
    }

    /// Fold a subsequent live trade (arrival order).
    pub fn update(&mut self, price: Price, size: Size) {
        let price = price.as_decimal();
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume = self.volume.saturating_add(size.as_decimal());
        self.trade_count += 1;
    }

    /// Apply a late trade: extends high/low, adds volume, leaves open/close.
    ///
    /// A bar that has never seen a trade is seeded from the late price so its
    /// range does not start at zero.
    pub fn revise(&mut self, price: Price, size: Size) {
        let price = price.as_decimal();
        if self.is_empty() {
            self.high = price;
            self.low = price;
        } else {
            if price > self.high {
                self.high = price;
            }
            if price < self.low {
                self.low = price;
            }
        }
        self.volume = self.volume.saturating_add(size.as_decimal());
        self.revision_count += 1;
    }

    /// True once the volume sum has hit `Decimal::MAX`. Further trades still
    /// move high/low but no longer add volume.
    pub fn volume_saturated(&self) -> bool {
        self.volume == Decimal::MAX
    }

    /// True if neither live nor late trades contributed to this bar.
    pub fn is_empty(&self) -> bool {
        self.trade_count == 0 && self.revision_count == 0
    }

    /// Validate bar integrity (OHLCV invariants).
    pub fn is_valid(&self) -> bool {
        if self.volume < Decimal::ZERO || self.low > self.high {
            return false;
        }
        if self.trade_count == 0 {
            // open/close are undefined without live trades and stay at zero
            return self.open.is_zero()
                && self.close.is_zero()
                && (self.revision_count > 0 || (self.high.is_zero() && self.volume.is_zero()));
        }
        self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}
