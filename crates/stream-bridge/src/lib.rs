//! Bounded chunk pipe bridging an asynchronous, push-style byte producer with
//! a synchronous, pull-style consumer on another context (typically a worker
//! thread doing blocking legacy I/O).
//!
//! Three pieces:
//! - a fixed-capacity blocking queue, so a fast producer is throttled to a
//!   small number of in-flight chunks;
//! - a reconstruction layer turning discrete chunks into one contiguous byte
//!   stream behind [`std::io::Read`];
//! - a deferred-release path for buffers whose backing resource may only be
//!   freed on the producer's context: fully consumed chunks park on a
//!   pending-release list until the producer redeems their handles via
//!   [`BridgeWriter::reclaim`].
//!
//! This crate is composed of several modules:
//! - `queue`: the bounded blocking FIFO.
//! - `chunk`: byte chunks and their release tokens.
//! - `bridge`: the writer/reader halves and the pull loop.
//! - `feed`: async producer pump (feature `feed`, default on).
//! - `error`: crate error types.
//! - `settings`: bridge configuration.
//!
//! This file (`lib.rs`) acts as a facade: it re-exports the main types and
//! functions from the internal modules to form the public API.

mod bridge;
mod chunk;
mod error;
mod queue;
mod settings;

#[cfg(feature = "feed")]
mod feed;

pub use crate::bridge::{bridge, BridgeReader, BridgeWriter, ShutdownHandle};
pub use crate::chunk::{Chunk, ReleaseHandle};
pub use crate::error::{ReclaimError, WriteError};
pub use crate::queue::BoundedQueue;
pub use crate::settings::Settings;

#[cfg(feature = "feed")]
pub use crate::error::FeedError;
#[cfg(feature = "feed")]
pub use crate::feed::{feed, feed_stream, FeedSummary};

pub use bytes::Bytes;
