//! Async producer pump.
//!
//! Why this exists
//! ---------------
//! [`BridgeWriter::write`](crate::BridgeWriter::write) blocks on a full
//! bridge, so an async producer must not call it from a task directly. The
//! pump moves the whole write/reclaim loop onto a blocking thread and feeds it
//! through a bounded channel, which keeps backpressure intact end to end:
//! async sender → channel → blocking write → bridge queue.
//!
//! Cancellation: a watcher task converts the [`CancellationToken`] into a
//! bridge shutdown, so a pump parked in a full-bridge write is released
//! promptly. A chunk rejected by that shutdown has its handle released in
//! place (the pump thread *is* the producer context).
//!
//! Completion: [`feed`] returns only after the consumer has observed
//! end-of-stream and every retired handle has been redeemed, so callers get
//! "all data delivered and all buffers returned" from a single await. Release
//! failures in mid-stream sweeps are logged and retried by later sweeps;
//! a failure in the final sweep is returned as [`FeedError::Release`].

use std::thread;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{pin_mut, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::BridgeWriter;
use crate::chunk::{Chunk, ReleaseHandle};
use crate::error::{FeedError, WriteError};

const RECLAIM_POLL: Duration = Duration::from_millis(5);

/// Accounting for a completed feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    /// Chunks delivered into the bridge.
    pub chunks: u64,
    /// Payload bytes delivered.
    pub bytes: u64,
    /// Release handles redeemed.
    pub released: u64,
}

/// Pumps chunks from `rx` into `writer` on a blocking thread until the
/// channel closes, then finishes the stream and drains releases until the
/// consumer is done.
pub async fn feed<H>(
    rx: mpsc::Receiver<Chunk<H>>,
    writer: BridgeWriter<H>,
    cancel: CancellationToken,
) -> Result<FeedSummary, FeedError>
where
    H: ReleaseHandle,
{
    let shutdown = writer.shutdown_handle();
    let watcher_cancel = cancel.clone();
    let watcher = tokio::spawn(async move {
        watcher_cancel.cancelled().await;
        shutdown.shutdown();
    });

    let pump = tokio::task::spawn_blocking(move || pump_loop(rx, &writer, &cancel));
    let result = match pump.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(FeedError::Cancelled),
    };
    watcher.abort();
    result
}

/// Forwards an async byte stream into a bridge of plain `Bytes` chunks.
pub async fn feed_stream<S>(
    stream: S,
    writer: BridgeWriter<()>,
    cancel: CancellationToken,
) -> Result<FeedSummary, FeedError>
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(writer.capacity());
    let forward_cancel = cancel.clone();
    let forward = tokio::spawn(async move {
        pin_mut!(stream);
        loop {
            tokio::select! {
                _ = forward_cancel.cancelled() => break,
                item = stream.next() => match item {
                    Some(data) => {
                        if tx.send(Chunk::from_bytes(data)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    let out = feed(rx, writer, cancel).await;
    let _ = forward.await;
    out
}

fn pump_loop<H>(
    mut rx: mpsc::Receiver<Chunk<H>>,
    writer: &BridgeWriter<H>,
    cancel: &CancellationToken,
) -> Result<FeedSummary, FeedError>
where
    H: ReleaseHandle,
{
    let mut summary = FeedSummary::default();

    loop {
        if cancel.is_cancelled() {
            writer.shutdown();
            return Err(FeedError::Cancelled);
        }
        let Some(chunk) = rx.blocking_recv() else {
            break;
        };
        let len = chunk.len() as u64;
        match writer.write_chunk(chunk) {
            Ok(()) => {
                summary.chunks += 1;
                summary.bytes += len;
            }
            Err(err) => {
                let cancelled = cancel.is_cancelled();
                let kind = match &err {
                    WriteError::Finished(_) => FeedError::Finished,
                    WriteError::Shutdown(_) => FeedError::Shutdown,
                };
                // Rejected chunk: this thread is the producer context, so
                // release its handle right here.
                if let Err(e) = err.into_chunk().into_handle().release() {
                    warn!("failed to release rejected chunk: {e}");
                }
                return Err(if cancelled { FeedError::Cancelled } else { kind });
            }
        }
        summary.released += reclaim_logged(writer) as u64;
    }

    debug!(
        chunks = summary.chunks,
        bytes = summary.bytes,
        "feed input exhausted, finishing stream"
    );
    writer.finish();

    // Keep redeeming until the consumer has retired everything it ever will.
    loop {
        match writer.reclaim() {
            Ok(n) => summary.released += n as u64,
            Err(e) => {
                summary.released += e.released as u64;
                return Err(FeedError::Release(e.source.to_string()));
            }
        }
        if writer.consumer_finished() && writer.pending_release_len() == 0 {
            break;
        }
        if cancel.is_cancelled() {
            writer.shutdown();
            summary.released += reclaim_logged(writer) as u64;
            return Err(FeedError::Cancelled);
        }
        thread::sleep(RECLAIM_POLL);
    }

    Ok(summary)
}

fn reclaim_logged<H: ReleaseHandle>(writer: &BridgeWriter<H>) -> usize {
    match writer.reclaim() {
        Ok(n) => n,
        Err(e) => {
            warn!(released = e.released, "release failure during feed: {}", e.source);
            e.released
        }
    }
}
