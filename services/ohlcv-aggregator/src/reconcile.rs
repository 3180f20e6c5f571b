//! Late-trade reconciliation
//!
//! A late trade belongs to a window that has already closed. Its bar key is
//! computed from the trade time on the window grid, and the stored bar is
//! revised in place: high/low/volume move, open/close never do.

use tracing::debug;
use types::bar::Bar;
use types::ids::WindowKey;
use types::trade::Trade;

use crate::bars::BarStore;
use crate::window::WindowGrid;

/// Result of reconciling one late trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The stored bar was revised; carries the bar after revision.
    Revised { key: WindowKey, bar: Bar },
    /// No stored bar for the computed key (not closed yet, or evicted).
    Unmatched { key: WindowKey },
}

/// Revises closed bars with late trades.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    grid: WindowGrid,
}

impl Reconciler {
    pub fn new(grid: WindowGrid) -> Self {
        Self { grid }
    }

    /// Apply `trade`, executed at `late_trade_time` (Unix nanos), to the bar
    /// whose window contains that instant.
    pub fn reconcile(
        &self,
        late_trade_time: i64,
        trade: &Trade,
        store: &mut BarStore,
    ) -> Reconciliation {
        let key = self.grid.key_for(late_trade_time);

        let Some(bar) = store.get_mut(key) else {
            debug!(
                window = %key,
                trade_time = late_trade_time,
                "No closed bar for late trade"
            );
            return Reconciliation::Unmatched { key };
        };

        let previous_high = bar.high;
        let previous_low = bar.low;
        bar.revise(trade.price, trade.size);

        if bar.high != previous_high {
            debug!(
                window = %key,
                price = %trade.price,
                previous_high = %previous_high,
                "Late trade set new high"
            );
        }
        if bar.low != previous_low {
            debug!(
                window = %key,
                price = %trade.price,
                previous_low = %previous_low,
                "Late trade set new low"
            );
        }

        Reconciliation::Revised {
            key,
            bar: bar.clone(),
        }
    }
}
