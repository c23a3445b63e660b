//! Storage error types

use thiserror::Error;

/// Error type for recording storage
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure (disk full, permission denied, ...)
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File name outside the recording alphabet
    #[error("Invalid recording file name: {0}")]
    InvalidFilename(String),

    /// No such recording
    #[error("Recording not found: {0}")]
    NotFound(String),

    /// Every disambiguated name for this second is taken
    #[error("No free recording name for {0}")]
    NameExhausted(String),
}
