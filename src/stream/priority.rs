//! The max-priority, round-robin-on-ties scheduling primitive shared by a
//! group's two pumps.
//!
//! A stream's priority is "neediness": queue depth for uploads, remaining
//! window for downloads. Both the registration (by a producer/consumer call)
//! and the deregistration (by the pump, once it has drained a stream's
//! current demand) go through [`PriorityTracker::update`], which keeps the
//! priority-to-index map and the index-to-priority map mutating atomically
//! under one lock — there is deliberately no separate per-stream priority
//! field for a pump to read out of lock-step with the map.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tokio::sync::{Mutex, Notify};

struct PriorityState {
    by_priority: BTreeMap<u64, VecDeque<usize>>,
    current: HashMap<usize, u64>,
}

pub(crate) struct PriorityTracker {
    state: Mutex<PriorityState>,
    notify: Notify,
}

impl PriorityTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(PriorityState {
                by_priority: BTreeMap::new(),
                current: HashMap::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Set `index`'s priority to `new_priority`, moving it between buckets
    /// (or removing/inserting it) as needed. Reinserting always lands at the
    /// back of its bucket, which is what gives equal-priority siblings
    /// round-robin fairness across repeated pump cycles. A priority of zero
    /// deregisters the stream entirely.
    pub(crate) async fn update(&self, index: usize, new_priority: u64) {
        let mut became_head = false;
        {
            let mut state = self.state.lock().await;
            if let Some(&old) = state.current.get(&index) {
                if old == new_priority {
                    return;
                }
                if let Some(bucket) = state.by_priority.get_mut(&old) {
                    bucket.retain(|&i| i != index);
                    if bucket.is_empty() {
                        state.by_priority.remove(&old);
                    }
                }
                state.current.remove(&index);
            }
            if new_priority > 0 {
                state.by_priority.entry(new_priority).or_default().push_back(index);
                state.current.insert(index, new_priority);
                became_head = matches!(state.by_priority.keys().next_back(), Some(&k) if k == new_priority);
            }
        }
        if became_head {
            self.notify.notify_waiters();
        }
    }

    /// Pop the front of the highest-priority bucket, deregistering it.
    pub(crate) async fn take_head(&self) -> Option<usize> {
        let mut state = self.state.lock().await;
        let key = *state.by_priority.keys().next_back()?;
        let bucket = state.by_priority.get_mut(&key).expect("key came from the map");
        let index = bucket.pop_front().expect("non-empty bucket");
        if bucket.is_empty() {
            state.by_priority.remove(&key);
        }
        state.current.remove(&index);
        Some(index)
    }

    /// True if `index` currently holds a registered (nonzero) priority.
    #[cfg(test)]
    pub(crate) async fn is_registered(&self, index: usize) -> bool {
        self.state.lock().await.current.contains_key(&index)
    }

    /// A future that resolves once some entry becomes the new head. Must be
    /// created before re-checking [`Self::take_head`] to avoid missing a
    /// concurrent [`Self::update`] that fires between the check and the wait.
    pub(crate) fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.notify.notified()
    }

    /// Wake every pump currently blocked on [`Self::notified`] — used on
    /// shutdown so a pump with an empty bucket re-checks the group's
    /// `pumping` flag instead of waiting forever.
    pub(crate) fn notify_heads(&self) {
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_head_returns_highest_priority() {
        let t = PriorityTracker::new();
        t.update(0, 5).await;
        t.update(1, 9).await;
        t.update(2, 3).await;
        assert_eq!(t.take_head().await, Some(1));
        assert_eq!(t.take_head().await, Some(0));
        assert_eq!(t.take_head().await, Some(2));
        assert_eq!(t.take_head().await, None);
    }

    #[tokio::test]
    async fn equal_priority_is_round_robin() {
        let t = PriorityTracker::new();
        t.update(0, 5).await;
        t.update(1, 5).await;
        assert_eq!(t.take_head().await, Some(0));
        // 0 was deregistered by take_head; re-registering at the same
        // priority sends it to the back of the bucket.
        t.update(0, 5).await;
        assert_eq!(t.take_head().await, Some(1));
        assert_eq!(t.take_head().await, Some(0));
    }

    #[tokio::test]
    async fn zero_priority_deregisters() {
        let t = PriorityTracker::new();
        t.update(0, 5).await;
        t.update(0, 0).await;
        assert!(!t.is_registered(0).await);
        assert_eq!(t.take_head().await, None);
    }
}
