//! Live audio relay
//!
//! A producer pushes audio chunks over HTTP into a named stream; any number of
//! listeners receive those chunks in real time; when the producer stops the
//! stream, the complete recording is written to storage.
//!
//! ```no_run
//! use audio_relay::{RelayServer, ServerConfig};
//!
//! # async fn run() -> audio_relay::Result<()> {
//! let server = RelayServer::new(ServerConfig::default().storage_dir("recordings"));
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

pub mod error;
pub mod registry;
pub mod server;
pub mod storage;

pub use error::{Error, Result};
pub use registry::{
    ListenerHandle, OverflowPolicy, Recv, RegistryConfig, RegistryError, StopOutcome,
    StreamChannel, StreamRegistry,
};
pub use server::{RelayServer, ServerConfig};
pub use storage::{FileSink, PersistenceSink, RecordingCatalog, StorageError};
