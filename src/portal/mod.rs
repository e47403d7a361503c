//! The portal worker pool: bounded, two-kind checkout of portal connections
//! with bandwidth-derived timeouts and a one-shot retry loop.

pub mod client;
pub mod pool;

pub use client::{HttpPortalClient, PortalClient, PortalResponse, UploadFile};
pub use pool::{PortalPool, Worker};
