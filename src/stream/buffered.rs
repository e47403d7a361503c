//! A single buffered, resumable stream: a producer-side upload queue and a
//! consumer-side download window, pumped by its owning [`super::StreamGroup`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify};

use crate::error::{Error, PortalError};
use crate::manifest::Manifest;
use crate::portal::{PortalPool, Worker};
use crate::remote::{BYTES, RemoteStream};

use super::downloader::Downloader;
use super::priority::PriorityTracker;

struct Inner {
    queueup: VecDeque<u8>,
    offsetup: u64,
    tailup: u64,
    queuedown: BTreeMap<u64, Downloader>,
    offsetdown: u64,
    /// How far down-scheduling has progressed: the end of the longest
    /// contiguous run of `Downloader`s starting at `offsetdown`. Distinct
    /// from `offsetdown` itself (which only `xfer_local_down`'s consumption
    /// advances) so a window that is fully scheduled but not yet consumed
    /// correctly reports zero remaining down-priority instead of being
    /// rescheduled on every pump cycle.
    scheduled_down: u64,
    taildown: u64,
}

/// The end of the longest contiguous run of scheduled blocks starting at
/// `from`, given the blocks currently registered in `queuedown`.
fn contiguous_scheduled_end(queuedown: &BTreeMap<u64, Downloader>, from: u64) -> u64 {
    let mut end = from;
    while let Some(d) = queuedown.get(&end) {
        end = d.end;
    }
    end
}

/// One stream within a [`super::StreamGroup`].
///
/// `index` is this stream's stable address within the group, shared with
/// both priority trackers so a pump can look the stream back up after
/// popping its index off a [`PriorityTracker`].
pub struct BufferedStream {
    pub(crate) index: usize,
    remote: Arc<dyn RemoteStream>,
    pool: Arc<PortalPool>,
    max_block_size: u64,
    inner: Mutex<Inner>,
    /// Woken whenever the upload backlog shrinks (a flush completed) or the
    /// stream shuts down; backpressured producers wait on this.
    uploaded: Notify,
    /// Woken whenever a new block becomes visible in `queuedown` or the
    /// stream shuts down; consumers waiting for their next block wait on
    /// this.
    moredatadown: Arc<Notify>,
    /// Serializes concurrent `xfer_local_down` callers against each other.
    read_lock: Mutex<()>,
    pumping: AtomicBool,
    pub(crate) down_priorities: Arc<PriorityTracker>,
    pub(crate) up_priorities: Arc<PriorityTracker>,
}

impl BufferedStream {
    pub(crate) async fn open(
        index: usize,
        remote: Arc<dyn RemoteStream>,
        pool: Arc<PortalPool>,
        max_block_size: u64,
        down_priorities: Arc<PriorityTracker>,
        up_priorities: Arc<PriorityTracker>,
    ) -> Result<Self, Error> {
        let tip = remote.span(BYTES).await?.1;
        Ok(Self {
            index,
            remote,
            pool,
            max_block_size,
            inner: Mutex::new(Inner {
                queueup: VecDeque::new(),
                offsetup: tip,
                tailup: tip,
                queuedown: BTreeMap::new(),
                offsetdown: tip,
                scheduled_down: tip,
                taildown: tip,
            }),
            uploaded: Notify::new(),
            moredatadown: Arc::new(Notify::new()),
            read_lock: Mutex::new(()),
            pumping: AtomicBool::new(true),
            down_priorities,
            up_priorities,
        })
    }

    /// Bytes durably written to the remote so far.
    pub async fn size_up(&self) -> u64 {
        self.inner.lock().await.offsetup
    }

    /// Bytes accepted from the producer but not yet flushed.
    pub async fn backlog_up(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.tailup - inner.offsetup
    }

    /// Bytes durably written to the remote so far (alias of [`Self::size_up`]
    /// under the name the progress-reporting surface uses).
    pub async fn processed_up(&self) -> u64 {
        self.inner.lock().await.offsetup
    }

    /// `(bytes flushed, bytes ever accepted)`.
    pub async fn processed_and_total(&self) -> (u64, u64) {
        let inner = self.inner.lock().await;
        (inner.offsetup, inner.tailup)
    }

    /// `(manifest, bytes flushed, bytes ever accepted)` — enough to resume
    /// this stream's upload side elsewhere.
    pub async fn basic_tip_metadata(&self) -> (Manifest, u64, u64) {
        let (offsetup, tailup) = self.processed_and_total().await;
        (self.remote.identifiers().await, offsetup, tailup)
    }

    /// The manifest identifying this stream's remote object.
    pub async fn identifiers(&self) -> Manifest {
        self.remote.identifiers().await
    }

    async fn update_up_priority(&self) {
        let len = self.inner.lock().await.queueup.len() as u64;
        self.up_priorities.update(self.index, len).await;
    }

    /// Priority is the *unscheduled* remainder of the window
    /// (`taildown - scheduled_down`), not the unconsumed remainder — a
    /// window that is fully scheduled but not yet delivered has nothing left
    /// for `queue_net_down` to do, so it must not keep re-registering here.
    async fn update_down_priority(&self) {
        let (scheduled_down, taildown) = {
            let inner = self.inner.lock().await;
            (inner.scheduled_down, inner.taildown)
        };
        self.down_priorities
            .update(self.index, taildown.saturating_sub(scheduled_down))
            .await;
    }

    /// Queue producer bytes for upload, suspending while the backlog is at
    /// capacity (`2 * max_block_size`, or unbounded if `max_block_size == 0`).
    /// Returns early, without admitting the remainder, once the stream shuts
    /// down.
    pub async fn queue_local_up(&self, data: &[u8]) {
        let mut admitted = 0usize;
        while admitted < data.len() {
            let to_admit = loop {
                let notified = self.uploaded.notified();
                let cap_room = {
                    let inner = self.inner.lock().await;
                    if self.max_block_size == 0 {
                        usize::MAX
                    } else {
                        ((self.max_block_size * 2) as usize).saturating_sub(inner.queueup.len())
                    }
                };
                if cap_room > 0 {
                    break (data.len() - admitted).min(cap_room);
                }
                if !self.pumping.load(Ordering::Acquire) {
                    self.uploaded.notify_waiters();
                    return;
                }
                notified.await;
            };

            {
                let mut inner = self.inner.lock().await;
                inner
                    .queueup
                    .extend(data[admitted..admitted + to_admit].iter().copied());
                inner.tailup += to_admit as u64;
            }
            admitted += to_admit;
            self.update_up_priority().await;
        }
    }

    /// One flush cycle: drain up to `max_block_size` queued bytes and write
    /// them to the remote. Returns the number of bytes flushed, `0` if there
    /// was nothing to do, or `-1` once the stream has shut down with an
    /// empty queue (the pump's signal to stop considering this stream).
    ///
    /// Called only by the owning group's up-pump, and only when this stream
    /// is the current priority head — by the time it runs, the queue is
    /// known non-empty (barring a shutdown race, handled below).
    pub(crate) async fn xfer_net_up(&self) -> i64 {
        let pumping = self.pumping.load(Ordering::Acquire);
        let buffer: Vec<u8> = {
            let mut inner = self.inner.lock().await;
            if inner.queueup.is_empty() {
                if !pumping {
                    drop(inner);
                    self.uploaded.notify_waiters();
                    return -1;
                }
                return 0;
            }
            let take = if self.max_block_size == 0 {
                inner.queueup.len()
            } else {
                (self.max_block_size as usize).min(inner.queueup.len())
            };
            inner.queueup.drain(..take).collect()
        };

        let offset = self.inner.lock().await.offsetup;
        match self.remote.write(&buffer, BYTES, offset).await {
            Ok(()) => {
                let mut inner = self.inner.lock().await;
                inner.offsetup += buffer.len() as u64;
                drop(inner);
                self.uploaded.notify_waiters();
                self.update_up_priority().await;
                buffer.len() as i64
            }
            Err(e) => {
                tracing::error!(stream = self.index, error = %e, "upload flush failed, requeuing");
                let mut inner = self.inner.lock().await;
                for b in buffer.into_iter().rev() {
                    inner.queueup.push_front(b);
                }
                drop(inner);
                self.update_up_priority().await;
                0
            }
        }
    }

    /// Mirror the caller's read window onto the download side, evicting any
    /// in-flight blocks that no longer overlap it, then schedule fetches for
    /// the (possibly retargeted) window. Called by a consumer before reading
    /// so the prefetch pipeline tracks wherever the consumer currently is.
    pub async fn set_window(&self, offset: u64, eventual_tail: Option<u64>) -> Result<(), Error> {
        let tail = match eventual_tail {
            Some(t) => t,
            None => self.remote.span(BYTES).await?.1,
        };

        {
            let mut inner = self.inner.lock().await;
            inner.taildown = tail;
            let to_evict: Vec<u64> = inner
                .queuedown
                .iter()
                .filter(|(&key, d)| key > inner.taildown || d.end < offset)
                .map(|(&key, _)| key)
                .collect();
            for key in to_evict {
                if let Some(d) = inner.queuedown.remove(&key) {
                    d.join().await;
                }
            }
            let first = match self.remote.block_span(BYTES, offset, None).await {
                Ok((first, _)) => first,
                Err(PortalError::EndOfStream) => offset,
                Err(e) => return Err(e.into()),
            };
            inner.offsetdown = first;
            inner.scheduled_down = contiguous_scheduled_end(&inner.queuedown, first);
        }

        self.update_down_priority().await;
        Ok(())
    }

    /// Read `size` bytes starting at `offset` (or, if `size == 0`, everything
    /// up to `eventual_tail`), blocking on prefetch as needed. `eventual_tail`
    /// of `None` means "the remote's current tip".
    pub async fn xfer_local_down(
        &self,
        offset: u64,
        mut size: u64,
        eventual_tail: Option<u64>,
    ) -> Result<Vec<u8>, Error> {
        let _guard = self.read_lock.lock().await;

        self.set_window(offset, eventual_tail).await?;

        if size == 0 {
            let inner = self.inner.lock().await;
            size = inner.taildown.saturating_sub(offset);
        }
        let want_end = offset + size;

        // Wait until the block covering `offset` is at least registered.
        loop {
            let notified = self.moredatadown.notified();
            let (have_key, pumping) = {
                let inner = self.inner.lock().await;
                (inner.queuedown.contains_key(&inner.offsetdown), self.pumping.load(Ordering::Acquire))
            };
            if have_key || !pumping {
                break;
            }
            notified.await;
        }

        let mut result = Vec::with_capacity(size as usize);
        loop {
            let head_key = self.inner.lock().await.offsetdown;
            {
                let inner = self.inner.lock().await;
                if !inner.queuedown.contains_key(&head_key) {
                    break;
                }
            }

            let data = loop {
                let notified = self.moredatadown.notified();
                let peeked = {
                    let inner = self.inner.lock().await;
                    match inner.queuedown.get(&head_key) {
                        Some(d) => d.peek().await,
                        None => None,
                    }
                };
                match peeked {
                    Some(data) => break data,
                    None => {
                        if !self.pumping.load(Ordering::Acquire) {
                            break Vec::new();
                        }
                        notified.await;
                    }
                }
            };

            let block_start = head_key;
            let block_end = block_start + data.len() as u64;
            let take_from = offset.max(block_start).saturating_sub(block_start) as usize;
            let take_to = want_end.min(block_end).saturating_sub(block_start) as usize;
            if take_to > take_from && take_from <= data.len() {
                result.extend_from_slice(&data[take_from..take_to.min(data.len())]);
            }

            let is_final_partial = want_end < block_end;
            if is_final_partial {
                break;
            }

            {
                let mut inner = self.inner.lock().await;
                inner.queuedown.remove(&head_key);
                inner.offsetdown = block_end;
            }
            self.update_down_priority().await;

            if block_end >= want_end {
                break;
            }

            // Wait for the next block to arrive before continuing assembly.
            loop {
                let notified = self.moredatadown.notified();
                let (have_next, pumping) = {
                    let inner = self.inner.lock().await;
                    (inner.queuedown.contains_key(&inner.offsetdown), self.pumping.load(Ordering::Acquire))
                };
                if have_next || !pumping {
                    break;
                }
                notified.await;
            }
        }

        Ok(result)
    }

    /// Schedule downloads covering the currently registered window, starting
    /// with one blocking worker checkout followed by as many non-blocking
    /// ones as are free. Returns the number of bytes newly scheduled, `0` if
    /// nothing was scheduled, or `-1` once shut down with nothing left to do.
    ///
    /// Called only by the owning group's down-pump, only when this stream is
    /// the current priority head.
    pub(crate) async fn queue_net_down(&self) -> i64 {
        if !self.pumping.load(Ordering::Acquire) {
            self.moredatadown.notify_waiters();
            return -1;
        }

        let (mut offset, tail) = {
            let inner = self.inner.lock().await;
            (inner.scheduled_down, inner.taildown)
        };
        if offset >= tail {
            return 0;
        }
        let start = offset;

        let mut worker = match self.pool.take_worker(crate::config::TransferKind::Download, true).await {
            Some(w) => w,
            None => return 0,
        };
        match self.remote.block_span(BYTES, offset, Some(&mut worker)).await {
            Ok((bs, be)) => {
                offset = be;
                self.insert_downloader(bs, be, worker).await;
            }
            Err(_) => {
                self.pool.put_worker_back(worker).await;
                self.update_down_priority().await;
                return (offset - start) as i64;
            }
        }

        loop {
            if offset >= tail {
                break;
            }
            let mut w = match self.pool.take_worker(crate::config::TransferKind::Download, false).await {
                Some(w) => w,
                None => break,
            };
            match self.remote.block_span(BYTES, offset, Some(&mut w)).await {
                Ok((bs, be)) => {
                    offset = be;
                    self.insert_downloader(bs, be, w).await;
                }
                Err(_) => {
                    self.pool.put_worker_back(w).await;
                    break;
                }
            }
        }

        self.update_down_priority().await;
        (offset - start) as i64
    }

    async fn insert_downloader(&self, start: u64, end: u64, worker: Worker) {
        let downloader = Downloader::spawn(
            self.remote.clone(),
            self.pool.clone(),
            worker,
            start,
            end,
            self.moredatadown.clone(),
        );
        let mut inner = self.inner.lock().await;
        inner.queuedown.insert(start, downloader);
        // Only advance the scheduling cursor when this block extends the
        // contiguous run it covers; a concurrent `set_window` retargeting
        // the cursor mid-cycle is resolved there instead, by rescanning
        // `queuedown` from the new offset.
        if inner.scheduled_down == start {
            inner.scheduled_down = end;
        }
        drop(inner);
        self.moredatadown.notify_waiters();
    }

    /// Stop accepting new work. Idempotent: only the first call wakes
    /// waiters.
    pub(crate) async fn shutdown(&self) {
        if self.pumping.swap(false, Ordering::AcqRel) {
            self.uploaded.notify_waiters();
            self.moredatadown.notify_waiters();
        }
    }
}

impl Drop for BufferedStream {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.try_lock() {
            if inner.tailup != inner.offsetup {
                tracing::error!(
                    stream = self.index,
                    backlog = inner.tailup - inner.offsetup,
                    "buffered stream dropped with unflushed upload backlog"
                );
                std::process::abort();
            }
        }
    }
}
