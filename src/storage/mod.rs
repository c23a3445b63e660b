//! Recording storage
//!
//! Finished streams are handed to a [`PersistenceSink`] exactly once, at stop
//! time. [`FileSink`] writes one file per recording; [`RecordingCatalog`] serves
//! the read side (listing and fetching recordings).

pub mod catalog;
pub mod error;
pub mod naming;
pub mod sink;

pub use catalog::RecordingCatalog;
pub use error::StorageError;
pub use naming::sanitize_name;
pub use sink::{FileSink, PersistenceSink};
