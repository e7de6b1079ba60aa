//! Crate error types.
//!
//! Errors that reject a value hand that value back to the caller (the chunk,
//! and with it the release handle, stays owned by the producer). The feed
//! errors intentionally stay string-based where they would otherwise leak
//! caller-specific handle error types into the public API.

use std::fmt;

use crate::chunk::Chunk;

/// A write was refused; the rejected chunk is handed back untouched.
#[derive(thiserror::Error)]
pub enum WriteError<H> {
    /// The stream was already marked finished.
    #[error("write after finish")]
    Finished(Chunk<H>),

    /// The stream was shut down.
    #[error("write to a shut down stream")]
    Shutdown(Chunk<H>),
}

impl<H> WriteError<H> {
    /// Recovers the rejected chunk so its handle can be released by the
    /// caller.
    pub fn into_chunk(self) -> Chunk<H> {
        match self {
            Self::Finished(chunk) | Self::Shutdown(chunk) => chunk,
        }
    }
}

impl<H> fmt::Debug for WriteError<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished(chunk) => f.debug_tuple("Finished").field(chunk).finish(),
            Self::Shutdown(chunk) => f.debug_tuple("Shutdown").field(chunk).finish(),
        }
    }
}

/// A release handle could not be redeemed.
///
/// `released` counts the chunks freed before the failure. The failing chunk
/// has consumed its single redemption attempt; everything behind it is still
/// listed and a later reclaim call picks up from there.
#[derive(Debug, thiserror::Error)]
#[error("chunk release failed after {released} successful release(s)")]
pub struct ReclaimError<E> {
    pub released: usize,
    #[source]
    pub source: E,
}

/// Failure of the async producer pump.
#[cfg(feature = "feed")]
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed cancelled")]
    Cancelled,

    /// The bridge was marked finished while the feed was still running.
    #[error("bridge finished before the feed completed")]
    Finished,

    /// The bridge was shut down from elsewhere while the feed was running.
    #[error("bridge shut down during feed")]
    Shutdown,

    /// A release handle could not be redeemed during the final sweep.
    #[error("chunk release failed: {0}")]
    Release(String),
}
