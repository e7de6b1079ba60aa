//! Fixed-capacity blocking FIFO shared between the producer and consumer sides.
//!
//! Design
//! ------
//! - A single `Mutex` guards the item list and the active flag; two `Condvar`s
//!   (`not_empty`, `not_full`) are signaled on every transition that can
//!   unblock a waiter. No lock is held across a blocking wait.
//! - `enqueue` blocks while the queue is active and full, so a fast producer
//!   is throttled to `capacity` in-flight items.
//! - `dequeue` blocks while the queue is active and empty, and keeps popping
//!   remaining items after shutdown: deactivation never discards in-flight
//!   data. `None` is the tagged "shut down and drained" sentinel, so a valid
//!   zero-length item can never be mistaken for end-of-queue.
//! - `shutdown` wakes *all* waiters unconditionally. A woken enqueuer gets its
//!   item back in `Err`, a woken dequeuer drains whatever is left first, so
//!   the broad wake loses nothing.

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Condvar, Mutex};

use tracing::debug;

/// Thread-safe bounded FIFO with blocking enqueue/dequeue and a cooperative
/// shutdown signal.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct Inner<T> {
    items: VecDeque<T>,
    active: bool,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                active: true,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Pushes `item`, blocking while the queue is full.
    ///
    /// Returns `Err(item)` if the queue has been shut down, whether that is
    /// observed on entry or after being woken mid-wait; the caller keeps
    /// ownership and nothing is dropped silently. `items.len() <= capacity`
    /// holds at all times.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if !inner.active {
                return Err(item);
            }
            if inner.items.len() < self.capacity {
                inner.items.push_back(item);
                self.not_empty.notify_one();
                return Ok(());
            }
            inner = self.not_full.wait(inner).unwrap();
        }
    }

    /// Pops the front item, blocking while the queue is empty and active.
    ///
    /// A shut-down queue still yields its remaining items; `None` means shut
    /// down *and* drained.
    pub fn dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if !inner.active {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Pops the front item if one is present. Never blocks.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        let item = inner.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Current depth snapshot.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().active
    }

    /// Deactivates the queue and wakes every waiter. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if !inner.active {
                return;
            }
            inner.active = false;
            debug!(depth = inner.items.len(), "queue shut down");
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &inner.items.len())
            .field("active", &inner.active)
            .finish()
    }
}
