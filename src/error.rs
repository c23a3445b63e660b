//! Crate-level error type

use thiserror::Error;

use crate::registry::RegistryError;
use crate::storage::StorageError;

/// Error type for the relay server
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream registry failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Recording storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;
