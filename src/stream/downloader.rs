//! A short-lived task that fetches one storage block and publishes it back
//! to its owning stream.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::portal::{PortalPool, Worker};
use crate::remote::{BYTES, REAL, RemoteStream};

/// One in-flight (or completed) block fetch, bound to the worker it was
/// spawned with.
///
/// The fetched bytes are published into a shared cell rather than returned
/// by consuming the task's [`JoinHandle`], because [`crate::stream::buffered::BufferedStream::xfer_local_down`]
/// may need to read the same block across multiple calls without removing
/// it from `queuedown` (the "final partial block is retained" rule).
pub(crate) struct Downloader {
    pub(crate) start: u64,
    pub(crate) end: u64,
    result: Arc<Mutex<Option<Vec<u8>>>>,
    handle: JoinHandle<()>,
}

impl Downloader {
    /// Spawn a task that fetches `[start, end)` using `worker`, releasing
    /// the worker back to `pool` on completion and waking `moredatadown`.
    pub(crate) fn spawn(
        remote: Arc<dyn RemoteStream>,
        pool: Arc<PortalPool>,
        mut worker: Worker,
        start: u64,
        end: u64,
        moredatadown: Arc<Notify>,
    ) -> Self {
        let result = Arc::new(Mutex::new(None));
        let result_task = result.clone();

        let handle = tokio::spawn(async move {
            let data = match remote.read(BYTES, start, REAL, &mut worker).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(start, end, error = %e, "downloader read failed");
                    Vec::new()
                }
            };
            pool.put_worker_back(worker).await;
            *result_task.lock().await = Some(data);
            moredatadown.notify_waiters();
        });

        Self {
            start,
            end,
            result,
            handle,
        }
    }

    /// Read the block's bytes if the fetch has completed, without consuming
    /// or removing the downloader.
    pub(crate) async fn peek(&self) -> Option<Vec<u8>> {
        self.result.lock().await.clone()
    }

    /// Await the fetch to completion (used when evicting a downloader that
    /// no longer falls in a consumer's window — the portal client has no
    /// cancellation, so an eviction still waits out the in-flight fetch).
    pub(crate) async fn join(self) {
        let _ = self.handle.await;
    }
}
