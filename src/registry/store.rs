//! Stream registry implementation
//!
//! The process-wide index of live stream channels. Each registry instance is
//! independent; the server owns one and shares it with request handlers.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::storage::PersistenceSink;

use super::channel::{ChannelStats, StopOutcome, StreamChannel};
use super::config::RegistryConfig;
use super::error::RegistryError;
use super::listener::ListenerHandle;

/// Central registry for all live streams
///
/// The map lock only guards membership. Channel internals have their own lock,
/// so operations on different names never contend beyond the map lookup.
pub struct StreamRegistry {
    /// Map of stream name to channel, shared with in-flight stop tasks
    streams: Arc<RwLock<HashMap<String, Arc<StreamChannel>>>>,

    /// Where stopped streams are persisted
    sink: Arc<dyn PersistenceSink>,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new(sink: Arc<dyn PersistenceSink>) -> Self {
        Self::with_config(sink, RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(sink: Arc<dyn PersistenceSink>, config: RegistryConfig) -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            sink,
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Start a stream
    ///
    /// Fails if a channel with this name is active, or is stopped with its
    /// recording not yet stored. A stopped and persisted channel is replaced.
    pub async fn start(&self, name: &str) -> Result<Arc<StreamChannel>, RegistryError> {
        let mut streams = self.streams.write().await;

        if let Some(existing) = streams.get(name) {
            if !existing.is_stopped() {
                return Err(RegistryError::AlreadyActive(name.to_string()));
            }
            if existing.is_persistence_pending() {
                return Err(RegistryError::PersistencePending(name.to_string()));
            }
        }

        let channel = StreamChannel::new(name, self.config.clone(), Arc::clone(&self.sink));
        streams.insert(name.to_string(), Arc::clone(&channel));

        tracing::info!(stream = %name, streams = streams.len(), "Stream started");

        Ok(channel)
    }

    /// Look up a channel by name
    pub async fn lookup(&self, name: &str) -> Result<Arc<StreamChannel>, RegistryError> {
        self.streams
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Unregister a stream; returns false if it was not registered
    pub async fn remove(&self, name: &str) -> bool {
        let removed = self.streams.write().await.remove(name).is_some();
        if removed {
            tracing::debug!(stream = %name, "Stream removed");
        }
        removed
    }

    /// Names of all registered streams
    pub async fn list_active(&self) -> Vec<String> {
        let streams = self.streams.read().await;
        let mut names: Vec<String> = streams
            .iter()
            .filter(|(_, channel)| !channel.is_stopped())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Write a chunk to a stream
    pub async fn write(&self, name: &str, chunk: Bytes) -> Result<usize, RegistryError> {
        let channel = self.lookup(name).await?;
        channel.write(chunk).await
    }

    /// Attach a listener to a stream
    pub async fn subscribe(&self, name: &str) -> Result<ListenerHandle, RegistryError> {
        let channel = self.lookup(name).await?;
        channel.add_listener().await
    }

    /// Stop a stream, persist it and unregister it
    ///
    /// The stop runs in its own task, so dropping the returned future only stops
    /// the waiting: persistence and unregistration still complete. On a
    /// persistence failure the channel stays registered so the stop can be
    /// retried without losing the recording.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome, RegistryError> {
        let channel = self.lookup(name).await?;
        let streams = Arc::clone(&self.streams);
        let key = name.to_string();

        let task = tokio::spawn(async move {
            let outcome = channel.stop().await?;

            let mut streams = streams.write().await;
            // A new stream may have been started under this name in the meantime
            if streams
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &channel))
            {
                streams.remove(&key);
            }

            Ok::<_, RegistryError>(outcome)
        });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(RegistryError::StopInterrupted(name.to_string())),
        }
    }

    /// Get stream statistics
    pub async fn stats(&self, name: &str) -> Result<ChannelStats, RegistryError> {
        let channel = self.lookup(name).await?;
        Ok(channel.stats().await)
    }

    /// Get total number of registered streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
