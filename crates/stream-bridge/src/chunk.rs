//! Byte chunks and their deferred-release tokens.
//!
//! A [`Chunk`] pairs a read-only byte payload with an opaque handle that the
//! producer must redeem to free whatever resource backs the payload (a mapped
//! buffer, a managed-runtime reference, a pool slot). The consumer side only
//! ever copies out of the payload; redemption is a by-value call on the
//! producer side, so a handle cannot be released twice.

use std::convert::Infallible;
use std::fmt;

use bytes::Bytes;

/// Token redeemed exactly once, on the producer's context, to release the
/// resource backing a fully consumed chunk.
///
/// `release` consumes the handle; the type system rules out double release.
pub trait ReleaseHandle: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Frees the underlying resource.
    fn release(self) -> Result<(), Self::Error>;
}

/// Plain `Bytes` payloads need no external release step.
impl ReleaseHandle for () {
    type Error = Infallible;

    fn release(self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Immutable byte payload plus its release token.
pub struct Chunk<H> {
    data: Bytes,
    handle: H,
}

impl<H> Chunk<H> {
    pub fn new(data: Bytes, handle: H) -> Self {
        Self { data, handle }
    }

    /// Payload bytes, read-only.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the chunk, yielding its release token. This is the single
    /// redemption point.
    pub fn into_handle(self) -> H {
        self.handle
    }

    pub fn into_parts(self) -> (Bytes, H) {
        (self.data, self.handle)
    }
}

impl Chunk<()> {
    /// Wraps a payload that needs no release step.
    pub fn from_bytes(data: Bytes) -> Self {
        Self::new(data, ())
    }
}

impl<H> fmt::Debug for Chunk<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}
