//! Bridge configuration.

use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(3) {
    Some(n) => n,
    None => unreachable!(),
};

/// Settings for a chunk bridge.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum number of chunks enqueued but not yet pulled by the consumer.
    /// A producer writing faster than the consumer reads blocks once this many
    /// chunks are in flight. Fixed at construction.
    /// Default: 3.
    pub capacity: NonZeroUsize,

    /// When set, a pending-release list growing past this depth logs a single
    /// warning (the producer is probably not calling reclaim). Observability
    /// only; never changes behavior.
    /// Default: disabled.
    pub pending_warn_threshold: Option<NonZeroUsize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            pending_warn_threshold: None,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn pending_warn_threshold(mut self, threshold: NonZeroUsize) -> Self {
        self.pending_warn_threshold = Some(threshold);
        self
    }
}
