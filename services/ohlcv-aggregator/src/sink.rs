//! Outbound interface to the presentation layer
//!
//! Every tick produces one `Fresh` report for the window that just closed
//! and one `Revision` report per late trade that revised an older bar. When
//! the scheduler stops, the whole store is handed over in one final dump.

use std::sync::{Mutex, PoisonError};

use tracing::info;
use types::bar::Bar;
use types::ids::WindowKey;

/// Why a bar is being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// The window just closed.
    Fresh,
    /// A late trade revised an already-closed bar.
    Revision,
}

/// A bar handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarReport {
    pub key: WindowKey,
    pub bar: Bar,
    /// Trades folded into the bar on this report (live trades for a fresh
    /// bar, 1 for a revision).
    pub trade_count: u64,
    pub kind: ReportKind,
}

/// Receiver of finalized and revised bars.
pub trait BarSink: Send + Sync {
    fn emit(&self, report: &BarReport);

    /// Called once when the scheduler stops, with every stored bar in
    /// chronological order.
    fn final_dump(&self, bars: &[(WindowKey, Bar)]);
}

/// Writes reports as structured log events.
#[derive(Debug, Clone)]
pub struct LogSink {
    symbol: String,
}

impl LogSink {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

impl BarSink for LogSink {
    fn emit(&self, report: &BarReport) {
        let bar = &report.bar;
        match report.kind {
            ReportKind::Fresh => info!(
                symbol = %self.symbol,
                window = %bar.window_label,
                trades = report.trade_count,
                open = %bar.open,
                close = %bar.close,
                high = %bar.high,
                low = %bar.low,
                volume = %bar.volume,
                "Window closed"
            ),
            ReportKind::Revision => info!(
                symbol = %self.symbol,
                window = %bar.window_label,
                open = %bar.open,
                close = %bar.close,
                high = %bar.high,
                low = %bar.low,
                volume = %bar.volume,
                revisions = bar.revision_count,
                "Late trade revised bar"
            ),
        }
    }

    fn final_dump(&self, bars: &[(WindowKey, Bar)]) {
        info!(symbol = %self.symbol, bars = bars.len(), "Final bar report");
        for (key, bar) in bars {
            info!(
                symbol = %self.symbol,
                window = %bar.window_label,
                key = %key,
                open = %bar.open,
                close = %bar.close,
                high = %bar.high,
                low = %bar.low,
                volume = %bar.volume,
                trades = bar.trade_count,
                revisions = bar.revision_count,
                "Bar"
            );
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<BarReport>>,
    dump: Mutex<Option<Vec<(WindowKey, Bar)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports received so far, in emission order.
    pub fn reports(&self) -> Vec<BarReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fresh(&self) -> Vec<BarReport> {
        self.reports_of(ReportKind::Fresh)
    }

    pub fn revisions(&self) -> Vec<BarReport> {
        self.reports_of(ReportKind::Revision)
    }

    /// The final dump, once the scheduler has stopped.
    pub fn final_bars(&self) -> Option<Vec<(WindowKey, Bar)>> {
        self.dump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn reports_of(&self, kind: ReportKind) -> Vec<BarReport> {
        self.reports()
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect()
    }
}

impl BarSink for RecordingSink {
    fn emit(&self, report: &BarReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }

    fn final_dump(&self, bars: &[(WindowKey, Bar)]) {
        *self.dump.lock().unwrap_or_else(PoisonError::into_inner) = Some(bars.to_vec());
    }
}
