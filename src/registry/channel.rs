//! Stream channel: the per-name broadcast engine
//!
//! A channel accumulates every accepted chunk for the recording and fans each one
//! out to the listeners registered at the moment of the write.
//!
//! ```text
//!   write(chunk) ──lock──► buffer.extend(chunk)
//!                          for q in listeners: q.push(chunk.clone())
//!
//!   stop() ──lock──► state = Stopped, close listeners, freeze buffer
//!          ──unlock──► sink.save(name, frozen)   (serialized by the outcome lock)
//! ```
//!
//! Append and fan-out happen under one lock, the same one `stop` takes to freeze
//! the state, so an accepted write is always part of the persisted recording.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::storage::PersistenceSink;

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::listener::{ListenerHandle, ListenerId, ListenerQueue, PushOutcome};

/// State of a stream channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Accepting writes and listeners
    Active,
    /// Frozen; terminal
    Stopped,
}

/// Result of stopping a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The recording was stored under this identifier
    Saved(String),
    /// No bytes were written; nothing was stored
    NothingToSave,
}

/// Point-in-time statistics for a channel
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    /// Stream name
    pub name: String,
    /// Current state
    pub state: ChannelState,
    /// Total bytes accepted
    pub bytes_received: u64,
    /// Total chunks accepted
    pub chunks_received: u64,
    /// Number of registered listeners
    pub listeners: usize,
    /// When the channel was started
    pub started_at: DateTime<Utc>,
}

struct ChannelInner {
    state: ChannelState,
    buffer: BytesMut,
    frozen: Option<Bytes>,
    listeners: HashMap<ListenerId, Arc<ListenerQueue>>,
    bytes_received: u64,
    chunks_received: u64,
}

/// Broadcast engine for a single named stream
pub struct StreamChannel {
    name: String,
    config: RegistryConfig,
    sink: Arc<dyn PersistenceSink>,

    /// State, buffer and listener set behind one lock
    inner: Mutex<ChannelInner>,

    /// Serializes persistence attempts and caches the first success
    outcome: Mutex<Option<StopOutcome>>,

    /// Mirrors `inner.state` for lock-free checks
    stopped: AtomicBool,
    persisted: AtomicBool,
    next_listener_id: AtomicU64,
    started_at: DateTime<Utc>,
}

impl StreamChannel {
    /// Create a new active channel
    pub fn new(
        name: impl Into<String>,
        config: RegistryConfig,
        sink: Arc<dyn PersistenceSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            config,
            sink,
            inner: Mutex::new(ChannelInner {
                state: ChannelState::Active,
                buffer: BytesMut::new(),
                frozen: None,
                listeners: HashMap::new(),
                bytes_received: 0,
                chunks_received: 0,
            }),
            outcome: Mutex::new(None),
            stopped: AtomicBool::new(false),
            persisted: AtomicBool::new(false),
            next_listener_id: AtomicU64::new(1),
            started_at: Utc::now(),
        })
    }

    /// Stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        if self.is_stopped() {
            ChannelState::Stopped
        } else {
            ChannelState::Active
        }
    }

    /// Check if the channel has stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stopped, but the recording has not been stored yet
    pub fn is_persistence_pending(&self) -> bool {
        self.is_stopped() && !self.persisted.load(Ordering::Acquire)
    }

    /// Append a chunk and deliver it to every registered listener
    ///
    /// Returns the number of listeners the chunk was queued for. Listeners whose
    /// consumer is gone are pruned; they never fail the write.
    pub async fn write(&self, chunk: Bytes) -> Result<usize, RegistryError> {
        if chunk.is_empty() {
            return Err(RegistryError::EmptyPayload);
        }

        let mut inner = self.inner.lock().await;
        if inner.state != ChannelState::Active {
            return Err(RegistryError::NotActive(self.name.clone()));
        }

        inner.buffer.extend_from_slice(&chunk);
        inner.bytes_received += chunk.len() as u64;
        inner.chunks_received += 1;

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, queue) in inner.listeners.iter() {
            match queue.push(chunk.clone()) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::Overflowed => {
                    delivered += 1;
                    tracing::debug!(
                        stream = %self.name,
                        listener = id,
                        policy = ?self.config.overflow_policy,
                        "Listener queue full, chunk dropped"
                    );
                }
                PushOutcome::Gone => gone.push(*id),
            }
        }

        for id in gone {
            inner.listeners.remove(&id);
            tracing::debug!(
                stream = %self.name,
                listener = id,
                "Pruned listener with no consumer"
            );
        }

        Ok(delivered)
    }

    /// Register a new listener
    ///
    /// The listener receives every chunk written after this call returns.
    pub async fn add_listener(self: &Arc<Self>) -> Result<ListenerHandle, RegistryError> {
        let mut inner = self.inner.lock().await;
        if inner.state != ChannelState::Active {
            return Err(RegistryError::NotActive(self.name.clone()));
        }

        inner.listeners.retain(|_, queue| !queue.is_gone());

        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(ListenerQueue::new(&self.config));
        inner.listeners.insert(id, Arc::clone(&queue));

        tracing::info!(
            stream = %self.name,
            listener = id,
            listeners = inner.listeners.len(),
            "Listener attached"
        );

        Ok(ListenerHandle::new(
            id,
            self.name.clone(),
            queue,
            Arc::downgrade(self),
        ))
    }

    /// Remove a listener; returns false if it was not registered
    pub async fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.listeners.remove(&id).is_some();

        if removed {
            tracing::info!(
                stream = %self.name,
                listener = id,
                listeners = inner.listeners.len(),
                "Listener detached"
            );
        }

        removed
    }

    /// Number of registered listeners
    pub async fn listener_count(&self) -> usize {
        self.inner.lock().await.listeners.len()
    }

    /// Stop the channel and persist the recording
    ///
    /// The first call freezes the channel. Persistence is retried on later calls
    /// until it succeeds; after that every call returns the same outcome.
    pub async fn stop(&self) -> Result<StopOutcome, RegistryError> {
        let mut outcome = self.outcome.lock().await;
        if let Some(done) = outcome.as_ref() {
            return Ok(done.clone());
        }

        let recording = self.freeze().await;

        let result = if recording.is_empty() {
            StopOutcome::NothingToSave
        } else {
            match self.sink.save(&self.name, recording.clone()).await {
                Ok(id) => StopOutcome::Saved(id),
                Err(source) => {
                    tracing::error!(
                        stream = %self.name,
                        bytes = recording.len(),
                        error = %source,
                        "Failed to persist stream, keeping buffer for retry"
                    );
                    return Err(RegistryError::Persistence {
                        name: self.name.clone(),
                        source,
                    });
                }
            }
        };

        match &result {
            StopOutcome::Saved(id) => tracing::info!(
                stream = %self.name,
                bytes = recording.len(),
                file = %id,
                "Stream persisted"
            ),
            StopOutcome::NothingToSave => {
                tracing::info!(stream = %self.name, "Stream stopped with no data")
            }
        }

        *outcome = Some(result.clone());
        self.persisted.store(true, Ordering::Release);
        Ok(result)
    }

    /// Transition to stopped (once) and return the immutable recording
    async fn freeze(&self) -> Bytes {
        let mut inner = self.inner.lock().await;

        if inner.state == ChannelState::Active {
            inner.state = ChannelState::Stopped;
            self.stopped.store(true, Ordering::Release);

            let listeners = inner.listeners.len();
            for (_, queue) in inner.listeners.drain() {
                queue.close();
            }

            let buffer = std::mem::take(&mut inner.buffer);
            inner.frozen = Some(buffer.freeze());

            tracing::info!(
                stream = %self.name,
                bytes = inner.bytes_received,
                chunks = inner.chunks_received,
                listeners = listeners,
                "Stream stopped"
            );
        }

        inner.frozen.clone().unwrap_or_default()
    }

    /// Bytes accumulated so far (or the frozen recording once stopped)
    pub async fn recorded_len(&self) -> usize {
        let inner = self.inner.lock().await;
        match &inner.frozen {
            Some(frozen) => frozen.len(),
            None => inner.buffer.len(),
        }
    }

    /// Get channel statistics
    pub async fn stats(&self) -> ChannelStats {
        let inner = self.inner.lock().await;
        ChannelStats {
            name: self.name.clone(),
            state: inner.state,
            bytes_received: inner.bytes_received,
            chunks_received: inner.chunks_received,
            listeners: inner.listeners.len(),
            started_at: self.started_at,
        }
    }
}

impl std::fmt::Debug for StreamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamChannel")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::registry::listener::Recv;
    use crate::storage::StorageError;

    /// Sink that keeps recordings in memory and can be told to fail
    #[derive(Default)]
    struct MemorySink {
        saved: SyncMutex<Vec<(String, Bytes)>>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl PersistenceSink for MemorySink {
        async fn save(&self, base_name: &str, data: Bytes) -> Result<String, StorageError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            let mut saved = self.saved.lock();
            let id = format!("{}_{}.mp3", base_name, saved.len());
            saved.push((id.clone(), data));
            Ok(id)
        }
    }

    fn channel_with(sink: Arc<MemorySink>) -> Arc<StreamChannel> {
        StreamChannel::new("test", RegistryConfig::default(), sink)
    }

    const WAIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_write_fans_out_in_order() {
        let channel = channel_with(Arc::default());
        let mut a = channel.add_listener().await.unwrap();
        let mut b = channel.add_listener().await.unwrap();

        for chunk in [&b"one"[..], b"two", b"three"] {
            assert_eq!(channel.write(Bytes::copy_from_slice(chunk)).await.unwrap(), 2);
        }

        for listener in [&mut a, &mut b] {
            assert_eq!(listener.receive(WAIT).await, Recv::Chunk("one".into()));
            assert_eq!(listener.receive(WAIT).await, Recv::Chunk("two".into()));
            assert_eq!(listener.receive(WAIT).await, Recv::Chunk("three".into()));
        }
    }

    #[tokio::test]
    async fn test_late_listener_sees_only_later_chunks() {
        let channel = channel_with(Arc::default());
        channel.write(Bytes::from_static(b"early")).await.unwrap();

        let mut late = channel.add_listener().await.unwrap();
        channel.write(Bytes::from_static(b"later")).await.unwrap();

        assert_eq!(late.receive(WAIT).await, Recv::Chunk("later".into()));
        assert_eq!(late.receive(Duration::from_millis(20)).await, Recv::Timeout);
    }

    #[tokio::test]
    async fn test_default_config_never_drops_for_slow_listener() {
        let channel = channel_with(Arc::default());
        let mut slow = channel.add_listener().await.unwrap();

        // Well past the bounded policies' default capacity
        for i in 0..2000u32 {
            channel
                .write(Bytes::copy_from_slice(&i.to_be_bytes()))
                .await
                .unwrap();
        }

        for i in 0..2000u32 {
            assert_eq!(
                slow.receive(WAIT).await,
                Recv::Chunk(Bytes::copy_from_slice(&i.to_be_bytes()))
            );
        }
        assert_eq!(slow.dropped_chunks(), 0);
    }

    #[tokio::test]
    async fn test_empty_write_rejected() {
        let channel = channel_with(Arc::default());

        let result = channel.write(Bytes::new()).await;

        assert!(matches!(result, Err(RegistryError::EmptyPayload)));
        assert_eq!(channel.recorded_len().await, 0);
    }

    #[tokio::test]
    async fn test_stop_persists_full_buffer() {
        let sink = Arc::new(MemorySink::default());
        let channel = channel_with(Arc::clone(&sink));

        channel.write(Bytes::from_static(b"c1")).await.unwrap();
        channel.write(Bytes::from_static(b"c2")).await.unwrap();
        channel.write(Bytes::from_static(b"c3")).await.unwrap();

        let outcome = assert_ok!(channel.stop().await);

        assert_eq!(outcome, StopOutcome::Saved("test_0.mp3".into()));
        let saved = sink.saved.lock();
        assert_eq!(saved.len(), 1);
        assert_eq!(&saved[0].1[..], b"c1c2c3");
    }

    #[tokio::test]
    async fn test_stop_without_data() {
        let sink = Arc::new(MemorySink::default());
        let channel = channel_with(Arc::clone(&sink));

        assert_eq!(channel.stop().await.unwrap(), StopOutcome::NothingToSave);
        assert!(sink.saved.lock().is_empty());
        assert!(!channel.is_persistence_pending());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let sink = Arc::new(MemorySink::default());
        let channel = channel_with(Arc::clone(&sink));
        channel.write(Bytes::from_static(b"data")).await.unwrap();

        let first = channel.stop().await.unwrap();
        let second = channel.stop().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(sink.saved.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_stopped_channel_rejects_writes_and_listeners() {
        let channel = channel_with(Arc::default());
        channel.stop().await.unwrap();

        assert!(matches!(
            channel.write(Bytes::from_static(b"x")).await,
            Err(RegistryError::NotActive(_))
        ));
        assert!(matches!(
            channel.add_listener().await,
            Err(RegistryError::NotActive(_))
        ));
        assert_eq!(channel.state(), ChannelState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_ends_listeners_after_queued_chunks() {
        let channel = channel_with(Arc::default());
        let mut listener = channel.add_listener().await.unwrap();

        channel.write(Bytes::from_static(b"last")).await.unwrap();
        channel.stop().await.unwrap();

        assert_eq!(listener.receive(WAIT).await, Recv::Chunk("last".into()));
        assert_eq!(listener.receive(WAIT).await, Recv::Ended);
        assert!(listener.is_channel_stopped());
        assert_eq!(channel.listener_count().await, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_buffer_for_retry() {
        let sink = Arc::new(MemorySink::default());
        sink.failures_left.store(1, Ordering::SeqCst);
        let channel = channel_with(Arc::clone(&sink));
        channel.write(Bytes::from_static(b"precious")).await.unwrap();

        let err = assert_err!(channel.stop().await);
        assert!(matches!(err, RegistryError::Persistence { .. }));
        assert!(channel.is_persistence_pending());
        assert_eq!(channel.recorded_len().await, 8);

        let outcome = channel.stop().await.unwrap();
        assert!(matches!(outcome, StopOutcome::Saved(_)));
        assert_eq!(&sink.saved.lock()[0].1[..], b"precious");
        assert!(!channel.is_persistence_pending());
    }

    #[tokio::test]
    async fn test_dropped_listener_does_not_affect_others() {
        let channel = channel_with(Arc::default());
        let gone = channel.add_listener().await.unwrap();
        let mut stays = channel.add_listener().await.unwrap();

        drop(gone);

        assert_eq!(channel.write(Bytes::from_static(b"a")).await.unwrap(), 1);
        assert_eq!(channel.write(Bytes::from_static(b"b")).await.unwrap(), 1);
        assert_eq!(stays.receive(WAIT).await, Recv::Chunk("a".into()));
        assert_eq!(stays.receive(WAIT).await, Recv::Chunk("b".into()));
        assert_eq!(channel.listener_count().await, 1);
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let channel = channel_with(Arc::default());
        let listener = channel.add_listener().await.unwrap();
        let id = listener.id();

        listener.detach().await;

        assert!(!channel.remove_listener(id).await);
        assert_eq!(channel.listener_count().await, 0);
    }

    #[tokio::test]
    async fn test_stats_track_writes() {
        let channel = channel_with(Arc::default());
        let _listener = channel.add_listener().await.unwrap();
        channel.write(Bytes::from_static(b"1234")).await.unwrap();
        channel.write(Bytes::from_static(b"56")).await.unwrap();

        let stats = channel.stats().await;

        assert_eq!(stats.name, "test");
        assert_eq!(stats.state, ChannelState::Active);
        assert_eq!(stats.bytes_received, 6);
        assert_eq!(stats.chunks_received, 2);
        assert_eq!(stats.listeners, 1);
    }
}
