//! Trade ingestion for the aggregator
//!
//! Decodes feed frames, filters out non-trade records, and appends trades
//! to the shared pending buffer that the window scheduler drains.
//!
//! The buffer is a single `Vec` behind one mutex. Appends and drains both
//! take the lock, so a drain never observes a half-appended trade and no
//! trade is handed to two ticks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use types::trade::Trade;

use crate::events::{decode_frame, DecodeError, DecodedRecord};
use crate::metrics::AggregatorMetrics;

/// Errors that can occur when appending to the pending buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestionError {
    #[error("record of type `{0}` is not a trade")]
    NotATrade(String),
}

/// Trades received since the last flush, in arrival order.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    trades: Mutex<Vec<Trade>>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            trades: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Append a decoded trade. Status and other records are rejected.
    pub fn append(&self, trade: Trade) -> Result<(), IngestionError> {
        ensure_trade(&trade)?;
        self.lock().push(trade);
        Ok(())
    }

    /// Take everything buffered so far, leaving the buffer empty.
    pub fn drain_all(&self) -> Vec<Trade> {
        std::mem::take(&mut *self.lock())
    }

    /// Exclusive access to the buffer for the duration of the guard.
    ///
    /// The contents are plain values, so a guard poisoned by a panicking
    /// holder is recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, Vec<Trade>> {
        self.trades.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn ensure_trade(trade: &Trade) -> Result<(), IngestionError> {
    if trade.is_trade() {
        Ok(())
    } else {
        Err(IngestionError::NotATrade(
            trade.event_type.label().to_string(),
        ))
    }
}

/// Per-frame ingestion summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Trades appended to the pending buffer.
    pub appended: usize,
    /// Status records passed to logging.
    pub status: usize,
    /// Records of other channels.
    pub ignored: usize,
    /// Records skipped because they failed to decode.
    pub rejected: usize,
}

/// Decodes frames and feeds the pending buffer.
#[derive(Clone)]
pub struct Ingester {
    buffer: Arc<PendingBuffer>,
    metrics: Arc<AggregatorMetrics>,
}

impl Ingester {
    pub fn new(buffer: Arc<PendingBuffer>, metrics: Arc<AggregatorMetrics>) -> Self {
        Self { buffer, metrics }
    }

    /// Append one already-decoded trade.
    ///
    /// The append is counted before the buffer lock is released, so a tick
    /// never classifies a trade whose append is not yet counted.
    pub fn ingest_trade(&self, trade: Trade) -> Result<(), IngestionError> {
        ensure_trade(&trade)?;
        let mut pending = self.buffer.lock();
        pending.push(trade);
        self.metrics.record_appended();
        Ok(())
    }

    /// Decode a raw frame and append its trades.
    ///
    /// A frame that does not parse is rejected as a whole. Individual trade
    /// records that fail validation are skipped and counted; the rest of the
    /// frame is still ingested.
    pub fn ingest_frame(&self, frame: &[u8]) -> Result<FrameSummary, DecodeError> {
        self.metrics.record_frame();
        let records = decode_frame(frame).map_err(|e| {
            self.metrics.record_decode_failure();
            e
        })?;

        let mut summary = FrameSummary::default();
        for record in records {
            match record.decode() {
                Ok(DecodedRecord::Trade(trade)) => {
                    debug!(
                        price = %trade.price,
                        size = %trade.size,
                        timestamp = trade.timestamp_millis,
                        "Trade received"
                    );
                    match self.ingest_trade(trade) {
                        Ok(()) => summary.appended += 1,
                        Err(e) => {
                            warn!(error = %e, "Trade rejected by pending buffer");
                            summary.rejected += 1;
                        }
                    }
                }
                Ok(DecodedRecord::Status { status, message }) => {
                    self.metrics.record_status();
                    info!(
                        status = status.as_deref().unwrap_or(""),
                        message = message.as_deref().unwrap_or(""),
                        "Feed status"
                    );
                    summary.status += 1;
                }
                Ok(DecodedRecord::Ignored(kind)) => {
                    debug!(event_type = kind.label(), "Ignoring non-trade record");
                    summary.ignored += 1;
                }
                Err(e) => {
                    self.metrics.record_decode_failure();
                    warn!(error = %e, "Skipping undecodable record");
                    summary.rejected += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Consume frames until the channel closes or shutdown is signalled.
    ///
    /// Returns the number of frames processed.
    pub async fn run(
        self,
        mut frames: mpsc::Receiver<Vec<u8>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        info!("Ingestion task started");
        let mut processed = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        info!("Feed channel closed");
                        break;
                    };
                    processed += 1;
                    if let Err(e) = self.ingest_frame(&frame) {
                        warn!(error = %e, bytes = frame.len(), "Skipping undecodable frame");
                    }
                }
            }
        }

        info!(frames = processed, "Ingestion task stopped");
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::numeric::{Price, Size};
    use types::trade::EventType;

    fn trade(price: u64, ts: i64) -> Trade {
        Trade::new(Price::from_u64(price), Size::from_u64(1), ts)
    }

    fn ingester() -> (Ingester, Arc<PendingBuffer>, Arc<AggregatorMetrics>) {
        let buffer = Arc::new(PendingBuffer::new());
        let metrics = Arc::new(AggregatorMetrics::new());
        (
            Ingester::new(Arc::clone(&buffer), Arc::clone(&metrics)),
            buffer,
            metrics,
        )
    }

    #[test]
    fn test_append_and_drain() {
        let buffer = PendingBuffer::new();
        buffer.append(trade(100, 1)).unwrap();
        buffer.append(trade(101, 2)).unwrap();
        assert_eq!(buffer.len(), 2);

        let drained = buffer.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].price, Price::from_u64(100));
        assert!(buffer.is_empty());
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn test_status_record_rejected() {
        let buffer = PendingBuffer::new();
        let status = Trade::with_event_type(
            Price::from_u64(1),
            Size::ZERO,
            1,
            EventType::Status,
        );
        assert_eq!(
            buffer.append(status),
            Err(IngestionError::NotATrade("status".to_string()))
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_ingest_trade_counts_before_unlock() {
        let (ingester, buffer, metrics) = ingester();
        ingester.ingest_trade(trade(100, 1)).unwrap();

        // whoever takes the lock next already sees the append counted
        let pending = buffer.lock();
        assert_eq!(pending.len(), 1);
        assert_eq!(metrics.export()["trades_appended"], 1);
    }

    #[test]
    fn test_ingest_trade_rejects_status_uncounted() {
        let (ingester, buffer, metrics) = ingester();
        let status = Trade::with_event_type(Price::from_u64(1), Size::ZERO, 1, EventType::Status);
        assert!(ingester.ingest_trade(status).is_err());
        assert!(buffer.is_empty());
        assert_eq!(metrics.export()["trades_appended"], 0);
    }

    #[test]
    fn test_ingest_mixed_frame() {
        let (ingester, buffer, metrics) = ingester();
        let frame = br#"[
            {"ev":"status","status":"connected","message":"Connected Successfully"},
            {"ev":"XT","pair":"BTC-USD","p":100,"t":1000,"s":1},
            {"ev":"XQ","pair":"BTC-USD"},
            {"ev":"XT","pair":"BTC-USD","t":1001,"s":1},
            {"ev":"XT","pair":"BTC-USD","p":101,"t":1002,"s":2}
        ]"#;

        let summary = ingester.ingest_frame(frame).unwrap();
        assert_eq!(
            summary,
            FrameSummary {
                appended: 2,
                status: 1,
                ignored: 1,
                rejected: 1,
            }
        );
        assert_eq!(buffer.len(), 2);

        let exported = metrics.export();
        assert_eq!(exported["frames_received"], 1);
        assert_eq!(exported["trades_appended"], 2);
        assert_eq!(exported["status_records"], 1);
        assert_eq!(exported["decode_failures"], 1);
    }

    #[test]
    fn test_malformed_frame_counted() {
        let (ingester, buffer, metrics) = ingester();
        assert!(ingester.ingest_frame(b"{oops").is_err());
        assert!(buffer.is_empty());
        assert_eq!(metrics.export()["decode_failures"], 1);
    }

    #[tokio::test]
    async fn test_run_drains_channel_until_closed() {
        let (ingester, buffer, _metrics) = ingester();
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(br#"[{"ev":"XT","p":100,"t":1,"s":1}]"#.to_vec()).await.unwrap();
        tx.send(b"garbage".to_vec()).await.unwrap();
        tx.send(br#"[{"ev":"XT","p":101,"t":2,"s":1}]"#.to_vec()).await.unwrap();
        drop(tx);

        let processed = ingester.run(rx, shutdown_rx).await;
        assert_eq!(processed, 3);
        assert_eq!(buffer.len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (ingester, _buffer, _metrics) = ingester();
        let (_tx, rx) = mpsc::channel::<Vec<u8>>(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(ingester.run(rx, shutdown_rx));
        shutdown_tx.send(true).unwrap();

        let processed = task.await.unwrap();
        assert_eq!(processed, 0);
    }
}
