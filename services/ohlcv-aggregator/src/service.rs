//! Aggregator service wiring
//!
//! Owns the shared state (pending buffer, bar store, metrics), spawns the
//! ingestion and scheduler tasks, and coordinates their shutdown through one
//! watch signal.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use types::bar::Bar;
use types::ids::WindowKey;

use crate::backpressure::FeedHandle;
use crate::bars::BarStore;
use crate::config::AggregatorConfig;
use crate::ingestion::{Ingester, PendingBuffer};
use crate::metrics::AggregatorMetrics;
use crate::scheduler::{SharedBarStore, WindowScheduler};
use crate::sink::BarSink;
use crate::window::WindowGrid;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("aggregator task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Running aggregator: one ingestion task and one window scheduler.
pub struct AggregatorService {
    feed: FeedHandle,
    grid: WindowGrid,
    buffer: Arc<PendingBuffer>,
    store: SharedBarStore,
    metrics: Arc<AggregatorMetrics>,
    shutdown: watch::Sender<bool>,
    ingestion: JoinHandle<u64>,
    scheduler: JoinHandle<Vec<(WindowKey, Bar)>>,
}

impl AggregatorService {
    /// Start with a grid aligned to the current wall clock.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: &AggregatorConfig, sink: Arc<dyn BarSink>) -> Self {
        Self::spawn_with_grid(config, WindowGrid::aligned_to_now(config.window), sink)
    }

    pub fn spawn_with_grid(
        config: &AggregatorConfig,
        grid: WindowGrid,
        sink: Arc<dyn BarSink>,
    ) -> Self {
        let metrics = Arc::new(AggregatorMetrics::new());
        let buffer = Arc::new(PendingBuffer::new());
        let store: SharedBarStore = Arc::new(Mutex::new(BarStore::new()));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let (feed, frames) = FeedHandle::channel(
            config.frame_queue_capacity,
            config.overflow_policy,
            Arc::clone(&metrics),
        );

        let ingester = Ingester::new(Arc::clone(&buffer), Arc::clone(&metrics));
        let ingestion = tokio::spawn(ingester.run(frames, shutdown_rx.clone()));

        let scheduler = WindowScheduler::new(
            grid,
            config.stale_window,
            Arc::clone(&buffer),
            Arc::clone(&store),
            sink,
            Arc::clone(&metrics),
        )
        .with_stale_eviction(config.evict_stale_bars);
        let scheduler = tokio::spawn(scheduler.run(shutdown_rx));

        info!(
            symbol = %config.symbol,
            window_secs = config.window.as_secs(),
            stale_window_secs = config.stale_window.as_secs(),
            queue_capacity = config.frame_queue_capacity,
            overflow = %config.overflow_policy,
            evict_stale_bars = config.evict_stale_bars,
            "Aggregator started"
        );

        Self {
            feed,
            grid,
            buffer,
            store,
            metrics,
            shutdown,
            ingestion,
            scheduler,
        }
    }

    /// Producer handle for the feed reader.
    pub fn feed(&self) -> FeedHandle {
        self.feed.clone()
    }

    pub fn grid(&self) -> WindowGrid {
        self.grid
    }

    pub fn metrics(&self) -> Arc<AggregatorMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Trades waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Copy of the stored bars, oldest first.
    pub fn bars(&self) -> Vec<(WindowKey, Bar)> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Signal both tasks, wait for them, and return the final dump.
    ///
    /// Trades still pending when the signal fires are not folded.
    pub async fn shutdown(self) -> Result<Vec<(WindowKey, Bar)>, ServiceError> {
        info!("Shutting down aggregator");
        // send fails only when both tasks have already exited
        let _ = self.shutdown.send(true);
        drop(self.feed);

        let frames = self.ingestion.await?;
        let bars = self.scheduler.await?;

        info!(
            frames,
            bars = bars.len(),
            unfolded = self.buffer.len(),
            "Aggregator stopped"
        );
        Ok(bars)
    }
}
