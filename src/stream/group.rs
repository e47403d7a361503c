//! A set of streams sharing one portal pool, scheduled by neediness.
//!
//! Two pump tasks — one per direction — repeatedly take the highest-priority
//! stream off their direction's [`PriorityTracker`], run its one-shot
//! transfer method, and let that method re-register itself (or not) before
//! the next cycle. Popping (rather than peeking) the head on every cycle is
//! what gives equal-priority streams round-robin fairness: a served stream
//! always re-enters at the back of its bucket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;

use crate::config::GroupConfig;
use crate::error::Error;
use crate::events::{StreamEvent, channel};
use crate::manifest::Manifest;
use crate::portal::PortalPool;
use crate::remote::RemoteStream;

use super::buffered::BufferedStream;
use super::priority::PriorityTracker;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Down,
    Up,
}

struct GroupInner {
    streams: RwLock<Vec<Arc<BufferedStream>>>,
    down_priorities: Arc<PriorityTracker>,
    up_priorities: Arc<PriorityTracker>,
    pool: Arc<PortalPool>,
    config: GroupConfig,
    pumping: AtomicBool,
    events: broadcast::Sender<StreamEvent>,
}

/// A collection of buffered streams, pumped together across one shared
/// portal pool.
pub struct StreamGroup {
    inner: Arc<GroupInner>,
    down_task: Mutex<Option<JoinHandle<()>>>,
    up_task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamGroup {
    /// Build an empty group backed by `pool`, and start its two pump tasks.
    pub fn new(pool: Arc<PortalPool>, config: GroupConfig) -> Self {
        let (events, _rx) = channel();
        let inner = Arc::new(GroupInner {
            streams: RwLock::new(Vec::new()),
            down_priorities: Arc::new(PriorityTracker::new()),
            up_priorities: Arc::new(PriorityTracker::new()),
            pool,
            config,
            pumping: AtomicBool::new(true),
            events,
        });

        let down_task = tokio::spawn(Self::pump_loop(inner.clone(), Direction::Down));
        let up_task = tokio::spawn(Self::pump_loop(inner.clone(), Direction::Up));

        Self {
            inner,
            down_task: Mutex::new(Some(down_task)),
            up_task: Mutex::new(Some(up_task)),
        }
    }

    /// Add a stream backed by `remote`, opening it from `manifest` if one is
    /// given. Returns its stable index within the group.
    pub async fn add(&self, remote: Arc<dyn RemoteStream>) -> Result<usize, Error> {
        let mut streams = self.inner.streams.write().await;
        let index = streams.len();
        let stream = BufferedStream::open(
            index,
            remote,
            self.inner.pool.clone(),
            self.inner.config.max_block_size,
            self.inner.down_priorities.clone(),
            self.inner.up_priorities.clone(),
        )
        .await?;
        streams.push(Arc::new(stream));
        Ok(index)
    }

    /// The stream at `index`, if it has been added.
    pub async fn get(&self, index: usize) -> Option<Arc<BufferedStream>> {
        self.inner.streams.read().await.get(index).cloned()
    }

    /// Number of streams currently held by the group.
    pub async fn size(&self) -> usize {
        self.inner.streams.read().await.len()
    }

    /// Queue `data` for upload on the stream at `index`, registering its
    /// demand with the up-pump.
    pub async fn queue_local_up(&self, index: usize, data: &[u8]) -> Result<(), Error> {
        let stream = self.get(index).await.ok_or(Error::NoSuchStream(index))?;
        stream.queue_local_up(data).await;
        Ok(())
    }

    /// Read `size` bytes starting at `offset` from the stream at `index`
    /// (or everything up to `eventual_tail` if `size == 0`).
    pub async fn xfer_local_down(
        &self,
        index: usize,
        offset: u64,
        size: u64,
        eventual_tail: Option<u64>,
    ) -> Result<Vec<u8>, Error> {
        let stream = self.get(index).await.ok_or(Error::NoSuchStream(index))?;
        stream.xfer_local_down(offset, size, eventual_tail).await
    }

    /// The manifest for the stream at `index`.
    pub async fn identifiers(&self, index: usize) -> Result<Manifest, Error> {
        let stream = self.get(index).await.ok_or(Error::NoSuchStream(index))?;
        Ok(stream.identifiers().await)
    }

    /// Subscribe to this group's stream lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    /// Stop accepting new work on every stream and wait for both pump tasks
    /// to drain. Idempotent: a second call observes the flag already clear
    /// and returns immediately.
    pub async fn shutdown(&self) {
        if self.inner.pumping.swap(false, Ordering::AcqRel) {
            let streams = self.inner.streams.read().await.clone();
            for (index, stream) in streams.iter().enumerate() {
                stream.shutdown().await;
                let _ = self.inner.events.send(StreamEvent::ShuttingDown { index });
            }
            self.inner.down_priorities.notify_heads();
            self.inner.up_priorities.notify_heads();
        }
        if let Some(handle) = self.down_task.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.up_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn pump_loop(inner: Arc<GroupInner>, direction: Direction) {
        let tracker = match direction {
            Direction::Down => &inner.down_priorities,
            Direction::Up => &inner.up_priorities,
        };
        loop {
            let notified = tracker.notified();
            match tracker.take_head().await {
                Some(index) => {
                    let stream = {
                        let streams = inner.streams.read().await;
                        streams.get(index).cloned()
                    };
                    let Some(stream) = stream else { continue };
                    let result = match direction {
                        Direction::Down => stream.queue_net_down().await,
                        Direction::Up => stream.xfer_net_up().await,
                    };
                    if result > 0 {
                        let event = match direction {
                            Direction::Down => StreamEvent::Downloaded {
                                index,
                                bytes: result as u64,
                            },
                            Direction::Up => StreamEvent::Uploaded {
                                index,
                                bytes: result as u64,
                            },
                        };
                        let _ = inner.events.send(event);
                    }
                }
                None => {
                    if !inner.pumping.load(Ordering::Acquire) {
                        break;
                    }
                    notified.await;
                }
            }
        }
    }
}
