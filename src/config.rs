//! Configuration types for bufferedskystream.

use serde::{Deserialize, Serialize};

/// Which direction a worker or transfer is dedicated to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    /// Fetching bytes from the portal network.
    Download,
    /// Pushing bytes to the portal network.
    Upload,
}

impl TransferKind {
    /// Both kinds, in a stable order (download before upload), for iterating
    /// a pool's two worker arrays uniformly.
    pub const ALL: [TransferKind; 2] = [TransferKind::Download, TransferKind::Upload];
}

/// Bandwidth budget and pool-size configuration for a [`crate::portal::pool::PortalPool`].
///
/// Groups settings related to how many simultaneous transfers of each kind
/// the pool allows and how aggressively it times them out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Aggregate download bandwidth budget, in bytes/sec, shared across all
    /// download workers (default: 1 MiB/s).
    #[serde(default = "default_bandwidth_down")]
    pub bandwidth_down_bps: f64,

    /// Aggregate upload bandwidth budget, in bytes/sec, shared across all
    /// upload workers (default: 1 MiB/s).
    #[serde(default = "default_bandwidth_up")]
    pub bandwidth_up_bps: f64,

    /// Number of simultaneous download workers (default: 4).
    #[serde(default = "default_pool_size")]
    pub download_workers: usize,

    /// Number of simultaneous upload workers (default: 4).
    #[serde(default = "default_pool_size")]
    pub upload_workers: usize,

    /// Hard floor under which the bandwidth-derived per-transfer timeout is
    /// never allowed to fall, in milliseconds (default: 2000ms). Prevents a
    /// large bandwidth budget from deriving an unreasonably short timeout
    /// for small transfers.
    #[serde(default = "default_min_timeout_ms")]
    pub min_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            bandwidth_down_bps: default_bandwidth_down(),
            bandwidth_up_bps: default_bandwidth_up(),
            download_workers: default_pool_size(),
            upload_workers: default_pool_size(),
            min_timeout_ms: default_min_timeout_ms(),
        }
    }
}

fn default_bandwidth_down() -> f64 {
    1024.0 * 1024.0
}

fn default_bandwidth_up() -> f64 {
    1024.0 * 1024.0
}

fn default_pool_size() -> usize {
    4
}

fn default_min_timeout_ms() -> u64 {
    2000
}

/// Per-group configuration — how each [`crate::stream::group::StreamGroup`]
/// chunks uploads and bounds local backpressure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Maximum number of bytes flushed to the remote object per upload pump
    /// cycle, and half the upload queue's backpressure cap (default: 128 MiB,
    /// matching the source's default). Zero means "no bound": flush
    /// everything queued in one call and never backpressure.
    #[serde(default = "default_max_block_size")]
    pub max_block_size: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            max_block_size: default_max_block_size(),
        }
    }
}

fn default_max_block_size() -> u64 {
    1024 * 1024 * 128
}

/// Configuration for the default HTTP-backed portal client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Base URLs of the portals to rotate across (e.g. `https://siasky.net`).
    pub portals: Vec<String>,

    /// Maximum number of bytes requested per download block (default: 4 MiB).
    #[serde(default = "default_block_size")]
    pub block_size: u64,

    /// Per-request retry ceiling before a one-shot call with `fail = true`
    /// gives up (default: 5). A one-shot call without `fail` retries
    /// indefinitely, relying on the caller's own shutdown path to stop it.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            portals: vec!["https://siasky.net".to_string()],
            block_size: default_block_size(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_block_size() -> u64 {
    1024 * 1024 * 4
}

fn default_max_retries() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_defaults_are_positive() {
        let cfg = PoolConfig::default();
        assert!(cfg.bandwidth_down_bps > 0.0);
        assert!(cfg.bandwidth_up_bps > 0.0);
        assert!(cfg.download_workers > 0);
        assert!(cfg.upload_workers > 0);
    }

    #[test]
    fn group_config_round_trips_through_json() {
        let cfg = GroupConfig {
            max_block_size: 4,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: GroupConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_block_size, 4);
    }

    #[test]
    fn portal_config_deserializes_with_partial_fields() {
        let json = r#"{"portals": ["https://example.com"]}"#;
        let cfg: PortalConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.portals, vec!["https://example.com".to_string()]);
        assert_eq!(cfg.block_size, default_block_size());
        assert_eq!(cfg.max_retries, default_max_retries());
    }
}
