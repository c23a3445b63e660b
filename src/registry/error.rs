//! Registry error types
//!
//! Error types for stream registry and channel operations.

use thiserror::Error;

use crate::storage::StorageError;

/// Error type for registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A live channel already exists under this name
    #[error("Stream already active: {0}")]
    AlreadyActive(String),

    /// No channel is registered under this name
    #[error("Stream not found: {0}")]
    NotFound(String),

    /// The channel has stopped and rejects writes and new listeners
    #[error("Stream not active: {0}")]
    NotActive(String),

    /// Zero-byte write
    #[error("Empty payload")]
    EmptyPayload,

    /// The recording could not be stored; the buffer is kept for a retry
    #[error("Failed to persist stream {name}: {source}")]
    Persistence {
        /// Stream name
        name: String,
        /// Underlying storage failure
        #[source]
        source: StorageError,
    },

    /// The stop task ended without reporting an outcome (runtime shutting down)
    #[error("Stop of stream {0} was interrupted")]
    StopInterrupted(String),

    /// A stopped channel with this name still holds an unsaved recording
    #[error("Stream {0} is stopped but its recording has not been saved yet")]
    PersistencePending(String),
}
