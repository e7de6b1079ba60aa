//! The chunk bridge: a producer half that pushes chunks and reclaims their
//! handles, and a consumer half that reads the logically concatenated bytes.
//!
//! Why this exists
//! ---------------
//! A push-style producer (typically async) and a pull-style blocking consumer
//! (a legacy `read(buf, len)` loop) run on different contexts and meet only at
//! a bounded queue. The one awkward inversion is buffer release: the consumer
//! knows when a chunk is fully copied out, but the resource behind it may only
//! be freed on the producer's context. Fully consumed chunks therefore move to
//! a pending-release list, under its own lock so producer-side reclaim never
//! contends with queue traffic, and the producer redeems their handles in
//! consumption order via [`BridgeWriter::reclaim`].
//!
//! The split into two single-owner halves is deliberate: `reclaim` only exists
//! on the writer and `read` only on the reader, so calling reclaim from the
//! consumer context is unrepresentable rather than a runtime assertion.
//! Neither half is `Clone`; the bridge is single-producer, single-consumer.
//!
//! Lifecycle: dropping the writer behaves like `finish` (the reader drains and
//! then sees end-of-stream); dropping the reader shuts the queue down so a
//! parked producer is released, and sweeps every unread chunk into the
//! pending-release list so the producer can still redeem all handles.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::chunk::{Chunk, ReleaseHandle};
use crate::error::{ReclaimError, WriteError};
use crate::queue::BoundedQueue;
use crate::settings::Settings;

/// Creates a bridge, returning the producer and consumer halves.
pub fn bridge<H: ReleaseHandle>(settings: Settings) -> (BridgeWriter<H>, BridgeReader<H>) {
    let shared = Arc::new(BridgeShared {
        queue: BoundedQueue::new(settings.capacity),
        pending: Mutex::new(VecDeque::new()),
        finished: AtomicBool::new(false),
        consumer_done: AtomicBool::new(false),
        pending_warn_threshold: settings.pending_warn_threshold.map(NonZeroUsize::get),
        pending_warned: AtomicBool::new(false),
    });
    (
        BridgeWriter {
            shared: Arc::clone(&shared),
        },
        BridgeReader {
            shared,
            current: None,
            offset: 0,
        },
    )
}

struct BridgeShared<H: ReleaseHandle> {
    queue: BoundedQueue<Chunk<H>>,
    /// Fully consumed chunks awaiting producer-side release, in consumption
    /// order. Guarded by its own lock; never touched while the queue lock is
    /// held.
    pending: Mutex<VecDeque<Chunk<H>>>,
    /// Monotonic: set once by finish (or writer drop), never cleared.
    finished: AtomicBool,
    /// Set once the reader has observed end-of-stream or gone away.
    consumer_done: AtomicBool,
    pending_warn_threshold: Option<usize>,
    pending_warned: AtomicBool,
}

impl<H: ReleaseHandle> BridgeShared<H> {
    fn push_pending(&self, chunk: Chunk<H>) {
        let depth = {
            let mut pending = self.pending.lock().unwrap();
            pending.push_back(chunk);
            pending.len()
        };
        if let Some(threshold) = self.pending_warn_threshold {
            if depth > threshold && !self.pending_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    depth,
                    threshold, "pending-release list keeps growing; is reclaim being called?"
                );
            }
        }
    }
}

trait Shutdown: Send + Sync {
    fn shutdown_queue(&self);
}

impl<H: ReleaseHandle> Shutdown for BridgeShared<H> {
    fn shutdown_queue(&self) {
        self.queue.shutdown();
    }
}

/// Cloneable, type-erased handle that shuts a bridge down from anywhere
/// (e.g. a cancellation watcher).
#[derive(Clone)]
pub struct ShutdownHandle {
    shared: Arc<dyn Shutdown>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.shared.shutdown_queue();
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle").finish_non_exhaustive()
    }
}

/// Producer half: writes chunks, marks the stream finished, reclaims handles.
pub struct BridgeWriter<H: ReleaseHandle> {
    shared: Arc<BridgeShared<H>>,
}

impl<H: ReleaseHandle> BridgeWriter<H> {
    /// Wraps `data` and `handle` in a chunk and enqueues it.
    ///
    /// Blocks while the bridge already holds `capacity` in-flight chunks; this
    /// is the backpressure bounding memory use regardless of producer speed.
    pub fn write(&self, data: Bytes, handle: H) -> Result<(), WriteError<H>> {
        self.write_chunk(Chunk::new(data, handle))
    }

    /// Enqueues an already-built chunk. See [`write`](Self::write).
    ///
    /// Writing after `finish` or after a shutdown fails fast and hands the
    /// chunk back, handle included.
    pub fn write_chunk(&self, chunk: Chunk<H>) -> Result<(), WriteError<H>> {
        if self.shared.finished.load(Ordering::Acquire) {
            return Err(WriteError::Finished(chunk));
        }
        self.shared.queue.enqueue(chunk).map_err(|chunk| {
            if self.shared.finished.load(Ordering::Acquire) {
                WriteError::Finished(chunk)
            } else {
                WriteError::Shutdown(chunk)
            }
        })
    }

    /// Marks the stream finished: no more writes will be accepted.
    ///
    /// The reader still drains every chunk written before this call, then
    /// observes end-of-stream; a reader parked on an empty queue is woken so
    /// it sees end-of-stream immediately.
    pub fn finish(&self) {
        if !self.shared.finished.swap(true, Ordering::AcqRel) {
            debug!("stream finished, closing queue for drain");
            self.shared.queue.shutdown();
        }
    }

    /// Redeems the handle of every fully consumed chunk, in consumption order.
    ///
    /// Must run on the producer's context; that is enforced by this method
    /// living on the writer half. Stops at the first failing handle and
    /// returns how many were released first; chunks behind the failure stay
    /// pending for a later call (the failed chunk has used its one redemption
    /// attempt). The pending lock is never held across a `release` call.
    pub fn reclaim(&self) -> Result<usize, ReclaimError<H::Error>> {
        let mut released = 0;
        loop {
            let chunk = self.shared.pending.lock().unwrap().pop_front();
            let Some(chunk) = chunk else { break };
            trace!(len = chunk.len(), "releasing consumed chunk");
            if let Err(source) = chunk.into_handle().release() {
                warn!(released, "chunk release failed, leaving remainder pending");
                return Err(ReclaimError { released, source });
            }
            released += 1;
        }
        self.shared.pending_warned.store(false, Ordering::Relaxed);
        Ok(released)
    }

    /// Shuts the bridge down: wakes parked callers on both sides. In-flight
    /// chunks are still drained by the reader.
    pub fn shutdown(&self) {
        self.shared.queue.shutdown();
    }

    /// Handle for shutting the bridge down from another context.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shared: Arc::clone(&self.shared) as Arc<dyn Shutdown>,
        }
    }

    /// Chunks enqueued but not yet pulled by the reader.
    pub fn in_flight(&self) -> usize {
        self.shared.queue.len()
    }

    /// Chunks consumed but not yet reclaimed.
    pub fn pending_release_len(&self) -> usize {
        self.shared.pending.lock().unwrap().len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// True once the reader has observed end-of-stream or been dropped; after
    /// that, no further chunks will ever be retired to the pending list.
    pub fn consumer_finished(&self) -> bool {
        self.shared.consumer_done.load(Ordering::Acquire)
    }
}

impl<H: ReleaseHandle> Drop for BridgeWriter<H> {
    fn drop(&mut self) {
        self.finish();
        // Last chance to redeem on the producer context.
        if let Err(e) = self.reclaim() {
            warn!(error = %e, "release failure while dropping writer");
        }
    }
}

impl<H: ReleaseHandle> fmt::Debug for BridgeWriter<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeWriter")
            .field("in_flight", &self.in_flight())
            .field("pending_release", &self.pending_release_len())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Consumer half: pulls chunks off the queue and exposes the concatenated
/// byte stream through a blocking [`std::io::Read`].
pub struct BridgeReader<H: ReleaseHandle> {
    shared: Arc<BridgeShared<H>>,
    current: Option<Chunk<H>>,
    /// Consumed bytes of `current`; `offset <= current.len()` always.
    offset: usize,
}

impl<H: ReleaseHandle> BridgeReader<H> {
    /// Copies up to `dst.len()` bytes, blocking for more chunks as needed.
    ///
    /// Returns fewer bytes than requested only at end-of-stream, and 0 on
    /// every call thereafter. May block indefinitely while the producer
    /// stalls; callers needing bounded latency should run this off any
    /// latency-sensitive context.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < dst.len() {
            let have_data = match self.current {
                Some(ref chunk) => self.offset < chunk.len(),
                None => false,
            };
            if !have_data && !self.next_chunk() {
                break;
            }
            let Some(chunk) = self.current.as_ref() else {
                break;
            };
            let n = (dst.len() - copied).min(chunk.len() - self.offset);
            dst[copied..copied + n].copy_from_slice(&chunk.bytes()[self.offset..self.offset + n]);
            self.offset += n;
            copied += n;
        }
        copied
    }

    /// Retires the exhausted current chunk to the pending-release list and
    /// pulls the next one. Blocks while the stream is unfinished and the queue
    /// is empty; returns false at end-of-stream without blocking.
    fn next_chunk(&mut self) -> bool {
        if let Some(done) = self.current.take() {
            self.offset = 0;
            self.shared.push_pending(done);
        }
        match self.shared.queue.dequeue() {
            Some(chunk) => {
                trace!(len = chunk.len(), "pulled next chunk");
                self.current = Some(chunk);
                self.offset = 0;
                true
            }
            None => {
                self.shared.consumer_done.store(true, Ordering::Release);
                false
            }
        }
    }

    /// Shuts the bridge down: wakes parked callers on both sides.
    pub fn shutdown(&self) {
        self.shared.queue.shutdown();
    }
}

impl<H: ReleaseHandle> io::Read for BridgeReader<H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf))
    }
}

impl<H: ReleaseHandle> Drop for BridgeReader<H> {
    fn drop(&mut self) {
        self.shared.queue.shutdown();
        if let Some(current) = self.current.take() {
            self.shared.push_pending(current);
        }
        // Unread chunks move to the pending list so the producer can still
        // redeem every handle.
        while let Some(chunk) = self.shared.queue.try_dequeue() {
            self.shared.push_pending(chunk);
        }
        self.shared.consumer_done.store(true, Ordering::Release);
    }
}

impl<H: ReleaseHandle> fmt::Debug for BridgeReader<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeReader")
            .field("current_len", &self.current.as_ref().map(Chunk::len))
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}
