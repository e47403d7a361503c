//! The collaborator contract: a remote, byte-addressable object accessed
//! through a pool of portal workers.
//!
//! [`RemoteStream`] is deliberately the only seam between the scheduler (the
//! buffered stream / stream group / downloader) and the storage network.
//! Swapping implementations — the default [`crate::http_remote::HttpRemoteStream`]
//! or an in-memory fake used in tests — changes nothing about how the
//! scheduler behaves.

use crate::error::PortalError;
use crate::manifest::Manifest;
use crate::portal::Worker;

/// The axis along which a remote object's extent is addressed. Only
/// `"bytes"` is used by this crate today; the string is kept open-ended so a
/// future axis (e.g. a chunk index) does not require a trait change.
pub const BYTES: &str = "bytes";

/// The read mode passed to [`RemoteStream::read`]. `"real"` requests the
/// actual block contents (as opposed to, say, a metadata-only probe).
pub const REAL: &str = "real";

/// A remote, byte-addressable object reachable through a pool of portal
/// workers.
///
/// Every method that talks to the network takes the specific worker it
/// should use, except [`Self::write`], which checks one out from the pool
/// itself (it is called from the up-pump, which has no block-aligned
/// worker to reuse the way the down-pump does).
#[async_trait::async_trait]
pub trait RemoteStream: Send + Sync {
    /// Inclusive-exclusive extent of the object along `axis`.
    async fn span(&self, axis: &str) -> Result<(u64, u64), PortalError>;

    /// The storage block containing `offset`, as a half-open byte range.
    /// Returns `Err(PortalError::EndOfStream)` once `offset` is at or past
    /// the object's tip — the sentinel `queue_net_down` uses as its loop
    /// terminator, not a user-visible error.
    async fn block_span(
        &self,
        axis: &str,
        offset: u64,
        worker: Option<&mut Worker>,
    ) -> Result<(u64, u64), PortalError>;

    /// Fetch one block starting at the block boundary containing `offset`,
    /// using the given already-checked-out worker.
    async fn read(
        &self,
        axis: &str,
        offset: u64,
        mode: &str,
        worker: &mut Worker,
    ) -> Result<Vec<u8>, PortalError>;

    /// Append-write `bytes` at `offset` (which must equal the current tip),
    /// advancing the tip and mutating the manifest.
    async fn write(&self, bytes: &[u8], axis: &str, offset: u64) -> Result<(), PortalError>;

    /// The current JSON manifest — identity plus tip.
    async fn identifiers(&self) -> Manifest;
}
