//! Stream lifecycle events, broadcast to any number of observers.

use tokio::sync::broadcast;

/// A notable transition in one of a group's streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// `bytes` were durably flushed to the remote for stream `index`.
    Uploaded { index: usize, bytes: u64 },
    /// `bytes` were fetched into the local download buffer for stream `index`.
    Downloaded { index: usize, bytes: u64 },
    /// Stream `index` has stopped accepting new work.
    ShuttingDown { index: usize },
}

/// Capacity of the broadcast channel backing [`crate::stream::StreamGroup::subscribe`].
/// Slow subscribers that fall this far behind start missing events (reported
/// to them as `RecvError::Lagged`), which matches `tokio::sync::broadcast`'s
/// usual best-effort fan-out contract.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub(crate) fn channel() -> (broadcast::Sender<StreamEvent>, broadcast::Receiver<StreamEvent>) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
