//! Buffered, concurrent, resumable streaming I/O over a content-addressed
//! portal network.
//!
//! A [`stream::StreamGroup`] holds any number of [`stream::BufferedStream`]s,
//! each backed by a [`remote::RemoteStream`] object reachable through a
//! shared [`portal::PortalPool`]. Producers queue bytes with
//! [`stream::BufferedStream::queue_local_up`]; consumers read them back with
//! [`stream::BufferedStream::xfer_local_down`]. Two background pumps move
//! bytes to and from the network, always servicing whichever stream needs it
//! most — upload queue depth for uploads, remaining read window for
//! downloads — with round-robin fairness between ties.

pub mod config;
pub mod error;
pub mod events;
pub mod http_remote;
pub mod manifest;
pub mod portal;
pub mod remote;
pub mod shutdown;
pub mod stream;

pub use config::{GroupConfig, PoolConfig, PortalConfig, TransferKind};
pub use error::{Error, PortalError, Result};
pub use events::StreamEvent;
pub use http_remote::HttpRemoteStream;
pub use manifest::Manifest;
pub use portal::{HttpPortalClient, PortalClient, PortalPool, Worker};
pub use remote::RemoteStream;
pub use shutdown::run_until_shutdown;
pub use stream::{BufferedStream, StreamGroup};
