//! Relay server listener
//!
//! Binds the TCP listener and serves the HTTP routes.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::registry::StreamRegistry;
use crate::server::config::ServerConfig;
use crate::server::routes::{router, AppState};
use crate::storage::{FileSink, PersistenceSink, RecordingCatalog};

/// Live audio relay server
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    catalog: RecordingCatalog,
}

impl RelayServer {
    /// Create a server that records into `config.storage_dir`
    pub fn new(config: ServerConfig) -> Self {
        let sink = Arc::new(FileSink::new(&config.storage_dir));
        Self::with_sink(config, sink)
    }

    /// Create a server with a custom persistence sink
    ///
    /// The recording routes still read from `config.storage_dir`.
    pub fn with_sink(config: ServerConfig, sink: Arc<dyn PersistenceSink>) -> Self {
        let registry = Arc::new(StreamRegistry::with_config(sink, config.registry.clone()));
        let catalog = RecordingCatalog::new(&config.storage_dir);

        Self {
            config,
            registry,
            catalog,
        }
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Build the router for this server
    pub fn router(&self) -> axum::Router {
        let state = AppState::new(
            Arc::clone(&self.registry),
            self.catalog.clone(),
            self.config.receive_timeout,
        );
        router(state, self.config.max_chunk_size)
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            storage = %self.config.storage_dir.display(),
            "Audio relay listening"
        );

        // Listen bodies stay open as long as their stream is live, so shutdown
        // drops the server future instead of waiting for connections to drain.
        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = axum::serve(listener, self.router()).into_future() => result,
        };

        let live = self.registry.list_active().await;
        if !live.is_empty() {
            tracing::warn!(
                streams = ?live,
                "Shutting down with live streams; their recordings are not saved"
            );
        }

        result.map_err(Into::into)
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
