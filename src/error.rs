//! Error types for bufferedskystream
//!
//! This module provides the error taxonomy used throughout the crate: a
//! crate-root [`Error`] for everything a caller can observe, and a nested
//! [`PortalError`] for transport-level detail absorbed by the pool's own
//! retry loop before it ever reaches a caller.

use thiserror::Error;

/// Result type alias for bufferedskystream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bufferedskystream.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the problem.
        message: String,
        /// The configuration key that caused the error, if known.
        key: Option<String>,
    },

    /// A portal transport operation failed after the pool's retry loop gave up.
    #[error("portal error: {0}")]
    Portal(#[from] PortalError),

    /// Serialization error (manifest or config).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The group or stream has been shut down and refuses new work.
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Requested a stream index that does not exist in the group.
    #[error("no stream at index {0}")]
    NoSuchStream(usize),

    /// Other error not covered by a more specific variant.
    #[error("{0}")]
    Other(String),
}

/// Transport-level errors from a single portal request.
///
/// These are absorbed by [`crate::portal::pool::PortalPool`]'s retry loop and
/// only surface to a caller when a one-shot call explicitly asked to fail
/// fast (`fail = true`).
#[derive(Debug, Error)]
pub enum PortalError {
    /// The underlying HTTP request failed (connection, DNS, TLS, etc).
    #[error("request to {url} failed: {source}")]
    Request {
        /// The portal URL that was contacted.
        url: String,
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The portal responded, but with a non-success status code.
    #[error("portal {url} returned status {status}")]
    Status {
        /// The portal URL that was contacted.
        url: String,
        /// The HTTP status code returned.
        status: u16,
    },

    /// The per-transfer timeout, computed from the bandwidth budget, elapsed.
    #[error("transfer timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The requested offset lies past the object's current tip.
    ///
    /// Not a user-visible error: this is the loop terminator `block_span`
    /// uses internally to signal end-of-stream (see §7 of the design notes).
    #[error("offset past end of stream")]
    EndOfStream,
}

impl PortalError {
    /// The portal URL this error is associated with, if any — used for the
    /// `tracing::warn!` log line the pool emits on every absorbed failure.
    pub fn url(&self) -> Option<&str> {
        match self {
            PortalError::Request { url, .. } => Some(url),
            PortalError::Status { url, .. } => Some(url),
            PortalError::Timeout(_) | PortalError::EndOfStream => None,
        }
    }
}
