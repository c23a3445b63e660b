//! Listener handles and their delivery queues
//!
//! Every listener owns a private queue. The channel pushes chunks into it while
//! holding its own lock; the consumer pops them at its own pace, so a slow
//! consumer only ever fills its own queue.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::channel::StreamChannel;
use super::config::{OverflowPolicy, RegistryConfig};

/// Identifier of a listener within its channel
pub type ListenerId = u64;

/// Result of a bounded wait on a listener queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recv {
    /// Next chunk in write order
    Chunk(Bytes),
    /// Nothing arrived within the timeout
    Timeout,
    /// The stream stopped and every queued chunk has been consumed
    Ended,
}

/// Outcome of pushing a chunk onto a listener queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PushOutcome {
    /// Chunk queued
    Queued,
    /// Queue was full; one chunk was discarded per the overflow policy
    Overflowed,
    /// The consumer is gone and the listener should be pruned
    Gone,
}

#[derive(Debug, Default)]
struct QueueState {
    chunks: VecDeque<Bytes>,
    closed: bool,
    gone: bool,
    dropped: u64,
}

/// Per-listener delivery queue shared between the channel and the handle
#[derive(Debug)]
pub(super) struct ListenerQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl ListenerQueue {
    pub(super) fn new(config: &RegistryConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: config.listener_queue_capacity.max(1),
            policy: config.overflow_policy,
        }
    }

    /// Enqueue a chunk, never blocking on the consumer
    pub(super) fn push(&self, chunk: Bytes) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.gone {
                return PushOutcome::Gone;
            }

            let full = self.policy != OverflowPolicy::Unbounded
                && state.chunks.len() >= self.capacity;

            if !full {
                state.chunks.push_back(chunk);
                PushOutcome::Queued
            } else {
                state.dropped += 1;
                if self.policy == OverflowPolicy::DropOldest {
                    state.chunks.pop_front();
                    state.chunks.push_back(chunk);
                }
                PushOutcome::Overflowed
            }
        };

        self.notify.notify_one();
        outcome
    }

    /// Mark end-of-stream; queued chunks stay readable
    pub(super) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// Mark the consumer as gone so the next push reports it
    pub(super) fn mark_gone(&self) {
        let mut state = self.state.lock();
        state.gone = true;
        state.chunks.clear();
    }

    pub(super) fn is_gone(&self) -> bool {
        self.state.lock().gone
    }

    fn try_pop(&self) -> Option<Recv> {
        let mut state = self.state.lock();
        if let Some(chunk) = state.chunks.pop_front() {
            Some(Recv::Chunk(chunk))
        } else if state.closed {
            Some(Recv::Ended)
        } else {
            None
        }
    }

    fn len(&self) -> usize {
        self.state.lock().chunks.len()
    }

    fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}

/// Consumer side of a subscription to one stream channel
///
/// Holds only a weak reference to the channel. Dropping the handle detaches it.
pub struct ListenerHandle {
    id: ListenerId,
    stream: String,
    queue: Arc<ListenerQueue>,
    channel: Weak<StreamChannel>,
    detached: bool,
}

impl ListenerHandle {
    pub(super) fn new(
        id: ListenerId,
        stream: String,
        queue: Arc<ListenerQueue>,
        channel: Weak<StreamChannel>,
    ) -> Self {
        Self {
            id,
            stream,
            queue,
            channel,
            detached: false,
        }
    }

    /// Listener identifier within its channel
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Name of the stream this listener is attached to
    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    /// Wait up to `timeout` for the next chunk
    ///
    /// Chunks queued before the stream stopped are still returned; `Ended` follows
    /// the last of them.
    pub async fn receive(&mut self, timeout: Duration) -> Recv {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // A push between try_pop and the await leaves a stored permit, so the
            // wakeup is not lost.
            if let Some(recv) = self.queue.try_pop() {
                return recv;
            }

            if tokio::time::timeout_at(deadline, self.queue.notify.notified())
                .await
                .is_err()
            {
                return self.queue.try_pop().unwrap_or(Recv::Timeout);
            }
        }
    }

    /// Whether the owning channel has stopped or no longer exists
    pub fn is_channel_stopped(&self) -> bool {
        self.channel
            .upgrade()
            .map(|channel| channel.is_stopped())
            .unwrap_or(true)
    }

    /// Number of chunks discarded because the queue was full
    pub fn dropped_chunks(&self) -> u64 {
        self.queue.dropped()
    }

    /// Detach from the channel and wait for the removal to complete
    pub async fn detach(mut self) {
        self.detached = true;
        self.queue.mark_gone();
        if let Some(channel) = self.channel.upgrade() {
            channel.remove_listener(self.id).await;
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        self.queue.mark_gone();

        // Removal needs the channel lock; hand it to the runtime when there is one.
        // Otherwise the next write prunes the listener.
        if let (Some(channel), Ok(runtime)) = (
            self.channel.upgrade(),
            tokio::runtime::Handle::try_current(),
        ) {
            let id = self.id;
            runtime.spawn(async move {
                channel.remove_listener(id).await;
            });
        }
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("stream", &self.stream)
            .field("queued", &self.queue.len())
            .finish()
    }
}
