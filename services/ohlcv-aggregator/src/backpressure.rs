//! Flow control between the feed reader and the ingestion task
//!
//! Raw frames travel through a bounded queue. When it is full the feed
//! reader either waits for room (`Block`) or the incoming frame is dropped
//! and counted (`DropNewest`). Blocking pushes the pressure back onto the
//! transport; dropping keeps the reader responsive at the cost of trades.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::metrics::AggregatorMetrics;

/// Policy when the frame queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Wait until the ingestion task frees a slot.
    Block,
    /// Discard the frame being submitted.
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop" | "drop_newest" | "drop-newest" => Ok(OverflowPolicy::DropNewest),
            other => Err(format!("unknown overflow policy `{other}` (expected block|drop)")),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Block => write!(f, "block"),
            OverflowPolicy::DropNewest => write!(f, "drop"),
        }
    }
}

/// Result of submitting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("frame queue closed")]
    Closed,
}

/// Producer side of the frame queue, handed to the feed reader.
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<Vec<u8>>,
    policy: OverflowPolicy,
    metrics: Arc<AggregatorMetrics>,
}

impl FeedHandle {
    /// Create a bounded frame queue. `capacity` is clamped to at least 1.
    pub fn channel(
        capacity: usize,
        policy: OverflowPolicy,
        metrics: Arc<AggregatorMetrics>,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                policy,
                metrics,
            },
            rx,
        )
    }

    /// Submit one raw frame according to the overflow policy.
    pub async fn submit(&self, frame: Vec<u8>) -> Result<SubmitOutcome, SubmitError> {
        match self.policy {
            OverflowPolicy::Block => {
                self.tx.send(frame).await.map_err(|_| SubmitError::Closed)?;
                Ok(SubmitOutcome::Queued)
            }
            OverflowPolicy::DropNewest => match self.tx.try_send(frame) {
                Ok(()) => Ok(SubmitOutcome::Queued),
                Err(TrySendError::Full(frame)) => {
                    self.metrics.record_frame_dropped();
                    warn!(
                        bytes = frame.len(),
                        capacity = self.tx.max_capacity(),
                        "Frame queue full, dropping frame"
                    );
                    Ok(SubmitOutcome::Dropped)
                }
                Err(TrySendError::Closed(_)) => Err(SubmitError::Closed),
            },
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Free slots in the queue right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}
