//! Line-delimited feed input
//!
//! Reads one JSON frame per line from any async reader (stdin in the
//! binary) and submits it to the frame queue. [`supervise`] runs the reader
//! alongside a stop condition so read failures reach the caller.

use std::future::Future;
use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::backpressure::{FeedHandle, SubmitOutcome};

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("reading feed input: {0}")]
    Read(#[from] io::Error),

    #[error("feed reader task failed: {0}")]
    Task(#[from] JoinError),
}

/// Forward non-blank lines from `input` as frames until EOF.
///
/// Returns the number of frames queued. Stops early without error if the
/// frame queue has been closed.
pub async fn read_frames<R>(input: R, feed: FeedHandle) -> Result<u64, FeedError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut queued = 0u64;
    let mut dropped = 0u64;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match feed.submit(line.into_bytes()).await {
            Ok(SubmitOutcome::Queued) => queued += 1,
            Ok(SubmitOutcome::Dropped) => dropped += 1,
            Err(e) => {
                warn!(error = %e, "Feed reader stopping");
                break;
            }
        }
    }

    info!(queued, dropped, "Feed input ended");
    Ok(queued)
}

/// Wait for `stop`, failing early if the reader task fails.
///
/// A reader that reaches EOF is not an error: the aggregator keeps closing
/// windows until `stop` completes. A reader still running when `stop`
/// completes is aborted.
pub async fn supervise<S>(
    stop: S,
    mut reader: JoinHandle<Result<u64, FeedError>>,
) -> Result<(), FeedError>
where
    S: Future<Output = ()>,
{
    tokio::pin!(stop);
    let mut reader_done = false;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            joined = &mut reader, if !reader_done => {
                reader_done = true;
                joined??;
            }
        }
    }

    if !reader_done {
        reader.abort();
    }
    Ok(())
}
