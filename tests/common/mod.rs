//! Shared test fixtures: an in-memory stand-in for a portal network.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bufferedskystream::{PortalClient, PortalConfig, PortalPool, PoolConfig};
use bufferedskystream::portal::{PortalResponse, UploadFile};
use bufferedskystream::error::PortalError;

/// A [`PortalClient`] backed by an in-process `HashMap`, so integration
/// tests exercise the real scheduler and pool without any network.
pub struct FakePortalClient {
    store: Mutex<HashMap<String, Vec<u8>>>,
    next_id: AtomicU64,
}

impl FakePortalClient {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

#[async_trait::async_trait]
impl PortalClient for FakePortalClient {
    async fn download(
        &self,
        _portal: &str,
        skylink: &str,
        ranges: &[(u64, u64)],
        max_size: u64,
        _timeout: Duration,
    ) -> Result<PortalResponse, PortalError> {
        let store = self.store.lock().unwrap();
        let full = store.get(skylink).cloned().unwrap_or_default();
        let data = match ranges.first() {
            Some((first, last)) => {
                let first = *first as usize;
                let end = (*last).min(first as u64 + max_size) as usize;
                full.get(first..end.min(full.len())).unwrap_or(&[]).to_vec()
            }
            None => full,
        };
        Ok(PortalResponse {
            data,
            filename: skylink.to_string(),
        })
    }

    async fn upload(
        &self,
        _portal: &str,
        _filename: &str,
        files: &[UploadFile],
        _timeout: Duration,
    ) -> Result<String, PortalError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let skylink = format!("fake-skylink-{id}");
        let bytes: Vec<u8> = files.iter().flat_map(|f| f.data.clone()).collect();
        self.store.lock().unwrap().insert(skylink.clone(), bytes);
        Ok(skylink)
    }
}

/// A small pool backed by [`FakePortalClient`], sized for deterministic
/// worker-conservation assertions.
pub fn fake_pool(download_workers: usize, upload_workers: usize) -> std::sync::Arc<PortalPool> {
    let pool_config = PoolConfig {
        download_workers,
        upload_workers,
        ..PoolConfig::default()
    };
    let portal_config = PortalConfig {
        portals: vec!["fake://portal".to_string()],
        ..PortalConfig::default()
    };
    std::sync::Arc::new(PortalPool::new(
        pool_config,
        portal_config,
        std::sync::Arc::new(FakePortalClient::new()),
    ))
}

/// Wraps [`FakePortalClient`] to fail every other request, so callers can
/// exercise the pool's retry loop without a real flaky network.
pub struct FlakyPortalClient {
    inner: FakePortalClient,
    calls: AtomicU64,
}

impl FlakyPortalClient {
    pub fn new() -> Self {
        Self {
            inner: FakePortalClient::new(),
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait::async_trait]
impl PortalClient for FlakyPortalClient {
    async fn download(
        &self,
        portal: &str,
        skylink: &str,
        ranges: &[(u64, u64)],
        max_size: u64,
        timeout: Duration,
    ) -> Result<PortalResponse, PortalError> {
        if self.calls.fetch_add(1, Ordering::Relaxed) % 2 == 0 {
            return Err(PortalError::Status {
                url: portal.to_string(),
                status: 503,
            });
        }
        self.inner.download(portal, skylink, ranges, max_size, timeout).await
    }

    async fn upload(
        &self,
        portal: &str,
        filename: &str,
        files: &[UploadFile],
        timeout: Duration,
    ) -> Result<String, PortalError> {
        if self.calls.fetch_add(1, Ordering::Relaxed) % 2 == 0 {
            return Err(PortalError::Status {
                url: portal.to_string(),
                status: 503,
            });
        }
        self.inner.upload(portal, filename, files, timeout).await
    }
}

/// A pool whose portal fails roughly half of every request, backed by
/// [`FlakyPortalClient`].
pub fn flaky_pool(download_workers: usize, upload_workers: usize) -> std::sync::Arc<PortalPool> {
    let pool_config = PoolConfig {
        download_workers,
        upload_workers,
        ..PoolConfig::default()
    };
    let portal_config = PortalConfig {
        portals: vec!["fake://portal".to_string()],
        ..PortalConfig::default()
    };
    std::sync::Arc::new(PortalPool::new(
        pool_config,
        portal_config,
        std::sync::Arc::new(FlakyPortalClient::new()),
    ))
}
