//! The portal worker pool: bounded checkout of portal workers across two
//! transfer kinds, bandwidth-derived timeouts, and a one-shot retry loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{Mutex, Semaphore};

use crate::config::{PoolConfig, PortalConfig, TransferKind};
use crate::error::PortalError;

use super::client::{PortalClient, PortalResponse, UploadFile};

/// A single in-flight transfer's bookkeeping, bound to one worker between a
/// `work_start` and its matching `work_stop`.
struct TransferHandle {
    portal_url: String,
    started_at: Instant,
}

/// A portal worker: a stable pool slot, checked out exclusively by one
/// caller at a time.
///
/// The worker does not own its own `reqwest::Client` — the pool's
/// [`PortalClient`] is shared (see `DESIGN.md`) — but it does own the
/// in-flight transfer state, which is mutated only by whichever caller
/// currently holds it, matching the source's single-writer invariant.
pub struct Worker {
    /// Stable index into the pool's combined worker numbering, assigned at
    /// construction and never reused while the pool lives.
    pub index: usize,
    /// Which direction this worker is dedicated to.
    pub kind: TransferKind,
    transfer: Option<TransferHandle>,
}

/// A bounded pool of portal workers, split by [`TransferKind`].
///
/// Checkout is mediated by a [`Semaphore`] per kind (permit count tracks
/// free-list length without the lost-wakeup hazard of a bare condition
/// variable) backed by a [`Mutex`]-guarded `Vec<Worker>` holding the actual
/// slots. `take_worker` acquiring a permit and popping the free list are
/// kept in lock-step: a successful acquire is always paired with a non-empty
/// pop, and `put_worker_back` always pushes before adding the matching
/// permit.
pub struct PortalPool {
    pool_config: PoolConfig,
    portal_config: PortalConfig,
    client: Arc<dyn PortalClient>,
    portal_cursor: AtomicUsize,
    free_download: Mutex<Vec<Worker>>,
    free_upload: Mutex<Vec<Worker>>,
    sem_download: Semaphore,
    sem_upload: Semaphore,
}

impl PortalPool {
    /// Construct a pool, creating `download_workers + upload_workers`
    /// workers with stable indices, all initially free.
    pub fn new(pool_config: PoolConfig, portal_config: PortalConfig, client: Arc<dyn PortalClient>) -> Self {
        let mut index = 0usize;
        let mut free_download = Vec::new();
        let mut free_upload = Vec::new();
        for kind in TransferKind::ALL {
            let count = match kind {
                TransferKind::Download => pool_config.download_workers,
                TransferKind::Upload => pool_config.upload_workers,
            };
            let list = match kind {
                TransferKind::Download => &mut free_download,
                TransferKind::Upload => &mut free_upload,
            };
            for _ in 0..count {
                list.push(Worker { index, kind, transfer: None });
                index += 1;
            }
        }

        let sem_download = Semaphore::new(free_download.len());
        let sem_upload = Semaphore::new(free_upload.len());

        Self {
            pool_config,
            portal_config,
            client,
            portal_cursor: AtomicUsize::new(0),
            free_download: Mutex::new(free_download),
            free_upload: Mutex::new(free_upload),
            sem_download,
            sem_upload,
        }
    }

    fn free_list(&self, kind: TransferKind) -> &Mutex<Vec<Worker>> {
        match kind {
            TransferKind::Download => &self.free_download,
            TransferKind::Upload => &self.free_upload,
        }
    }

    fn semaphore(&self, kind: TransferKind) -> &Semaphore {
        match kind {
            TransferKind::Download => &self.sem_download,
            TransferKind::Upload => &self.sem_upload,
        }
    }

    /// Check out a worker of the given kind. If `block` is true, suspends
    /// until one is available; otherwise returns `None` immediately if the
    /// free list is empty.
    pub async fn take_worker(&self, kind: TransferKind, block: bool) -> Option<Worker> {
        let sem = self.semaphore(kind);
        if block {
            sem.acquire().await.expect("pool semaphore never closed").forget();
        } else {
            match sem.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(_) => return None,
            }
        }
        let mut free = self.free_list(kind).lock().await;
        Some(
            free.pop()
                .expect("semaphore permit implies a free worker of this kind"),
        )
    }

    /// Return a worker to its kind's free list and wake one waiter.
    pub async fn put_worker_back(&self, worker: Worker) {
        let kind = worker.kind;
        self.free_list(kind).lock().await.push(worker);
        self.semaphore(kind).add_permits(1);
    }

    /// Observational count of free workers of the given kind.
    pub async fn available(&self, kind: TransferKind) -> usize {
        self.free_list(kind).lock().await.len()
    }

    /// Observational count of free download workers.
    pub async fn available_down(&self) -> usize {
        self.available(TransferKind::Download).await
    }

    /// Observational count of free upload workers.
    pub async fn available_up(&self) -> usize {
        self.available(TransferKind::Upload).await
    }

    /// The configured maximum request size per download block (`0` means
    /// unbounded — request the whole remaining range in one call).
    pub fn block_size(&self) -> u64 {
        self.portal_config.block_size
    }

    fn next_portal(&self) -> &str {
        let i = self.portal_cursor.fetch_add(1, Ordering::Relaxed) % self.portal_config.portals.len();
        &self.portal_config.portals[i]
    }

    /// Bind `worker` to a fresh transfer of the given kind, selecting the
    /// next portal in rotation. Must be paired with exactly one
    /// [`Self::work_stop`].
    fn work_start(&self, worker: &mut Worker, kind: TransferKind) -> String {
        assert_eq!(worker.kind, kind, "worker checked out for the wrong kind");
        assert!(
            worker.transfer.is_none(),
            "work_start called twice without a matching work_stop"
        );
        let portal_url = self.next_portal().to_string();
        worker.transfer = Some(TransferHandle {
            portal_url: portal_url.clone(),
            started_at: Instant::now(),
        });
        portal_url
    }

    /// Close the transfer bound by the matching `work_start`, recording the
    /// observed transferred size (0 on failure) for bandwidth accounting.
    fn work_stop(&self, worker: &mut Worker, size: u64) {
        let handle = worker
            .transfer
            .take()
            .expect("work_stop without a matching work_start");
        tracing::debug!(
            worker = worker.index,
            portal = %handle.portal_url,
            size,
            elapsed = ?handle.started_at.elapsed(),
            "transfer closed"
        );
    }

    /// The per-transfer timeout derived from the configured bandwidth
    /// budget: `1000ms * size / (bandwidth / pool_size)`, floored at
    /// `min_timeout_ms`.
    fn timeout_for(&self, kind: TransferKind, size: u64) -> Duration {
        let (bandwidth, workers) = match kind {
            TransferKind::Download => (
                self.pool_config.bandwidth_down_bps,
                self.pool_config.download_workers,
            ),
            TransferKind::Upload => (
                self.pool_config.bandwidth_up_bps,
                self.pool_config.upload_workers,
            ),
        };
        let per_worker_bandwidth = bandwidth / workers.max(1) as f64;
        let ms = if per_worker_bandwidth <= 0.0 {
            self.pool_config.min_timeout_ms
        } else {
            (1000.0 * size as f64 / per_worker_bandwidth) as u64
        };
        Duration::from_millis(ms.max(self.pool_config.min_timeout_ms))
    }

    /// Jittered backoff before a retry: 100-300ms, so a persistently
    /// unreachable portal doesn't spin the pool's retry loop hot.
    async fn backoff(&self) {
        let jitter_ms = rand::thread_rng().gen_range(100..300);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
    }

    /// High-level retry loop for a single download. If `worker` is `None`, a
    /// download worker is checked out for the duration of the call and
    /// returned to the pool before returning; if `Some`, the caller retains
    /// ownership throughout.
    pub async fn download(
        &self,
        skylink: &str,
        ranges: &[(u64, u64)],
        max_size: u64,
        fail: bool,
        worker: Option<&mut Worker>,
    ) -> Result<PortalResponse, PortalError> {
        let timeout = self.timeout_for(TransferKind::Download, max_size);
        let mut slot = match worker {
            Some(w) => WorkerSlot::Borrowed(w),
            None => WorkerSlot::Owned(
                self.take_worker(TransferKind::Download, true)
                    .await
                    .expect("blocking take_worker never returns None"),
            ),
        };

        let mut attempts: u32 = 0;
        let result = loop {
            let w = slot.get_mut();
            let portal_url = self.work_start(w, TransferKind::Download);
            match self
                .client
                .download(&portal_url, skylink, ranges, max_size, timeout)
                .await
            {
                Ok(response) => {
                    self.work_stop(slot.get_mut(), response.data.len() as u64);
                    break Ok(response);
                }
                Err(e) => {
                    tracing::warn!(portal = %e.url().unwrap_or(&portal_url), error = %e, "portal download failed");
                    self.work_stop(slot.get_mut(), 0);
                    attempts += 1;
                    if fail && attempts >= self.portal_config.max_retries {
                        break Err(e);
                    }
                    self.backoff().await;
                }
            }
        };

        if let WorkerSlot::Owned(w) = slot {
            self.put_worker_back(w).await;
        }
        result
    }

    /// High-level retry loop for a single upload. Symmetric to
    /// [`Self::download`].
    pub async fn upload(
        &self,
        filename: &str,
        files: &[UploadFile],
        fail: bool,
        worker: Option<&mut Worker>,
    ) -> Result<String, PortalError> {
        let size: u64 = files
            .iter()
            .map(|f| (f.data.len() + f.filename.len() + f.content_type.len()) as u64)
            .sum();
        let timeout = self.timeout_for(TransferKind::Upload, size);
        let mut slot = match worker {
            Some(w) => WorkerSlot::Borrowed(w),
            None => WorkerSlot::Owned(
                self.take_worker(TransferKind::Upload, true)
                    .await
                    .expect("blocking take_worker never returns None"),
            ),
        };

        let mut attempts: u32 = 0;
        let result = loop {
            let portal_url = self.work_start(slot.get_mut(), TransferKind::Upload);
            match self.client.upload(&portal_url, filename, files, timeout).await {
                Ok(skylink) => {
                    self.work_stop(slot.get_mut(), size);
                    break Ok(skylink);
                }
                Err(e) => {
                    tracing::warn!(portal = %e.url().unwrap_or(&portal_url), error = %e, "portal upload failed");
                    self.work_stop(slot.get_mut(), 0);
                    attempts += 1;
                    if fail && attempts >= self.portal_config.max_retries {
                        break Err(e);
                    }
                    self.backoff().await;
                }
            }
        };

        if let WorkerSlot::Owned(w) = slot {
            self.put_worker_back(w).await;
        }
        result
    }
}

/// Either a worker borrowed from the caller (who retains ownership) or one
/// checked out for the duration of a single call (returned to the pool when
/// the call ends).
enum WorkerSlot<'a> {
    Borrowed(&'a mut Worker),
    Owned(Worker),
}

impl WorkerSlot<'_> {
    fn get_mut(&mut self) -> &mut Worker {
        match self {
            WorkerSlot::Borrowed(w) => w,
            WorkerSlot::Owned(w) => w,
        }
    }
}
