//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::registry::RegistryConfig;

/// Default port, matching the `PORT` default of the single-queue relay
pub const DEFAULT_PORT: u16 = 5000;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Directory recordings are written to and served from
    pub storage_dir: PathBuf,

    /// How long a listen loop waits for a chunk before re-checking the stream
    pub receive_timeout: Duration,

    /// Largest accepted request body for a single chunk
    pub max_chunk_size: usize,

    /// Registry and listener queue settings
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            storage_dir: PathBuf::from("recordings"),
            receive_timeout: Duration::from_secs(1),
            max_chunk_size: 16 * 1024 * 1024, // 16MB
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the recording directory
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Set the listener receive timeout (minimum 1ms)
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Set the maximum chunk size
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    /// Set the registry configuration
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OverflowPolicy;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.storage_dir, PathBuf::from("recordings"));
        assert_eq!(config.receive_timeout, Duration::from_secs(1));
        assert_eq!(config.max_chunk_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 5001);
    }

    #[test]
    fn test_builder_receive_timeout_floor() {
        let config = ServerConfig::default().receive_timeout(Duration::ZERO);

        assert_eq!(config.receive_timeout, Duration::from_millis(1));
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .storage_dir("/tmp/audio")
            .receive_timeout(Duration::from_millis(250))
            .max_chunk_size(1024)
            .registry(RegistryConfig::default().overflow_policy(OverflowPolicy::DropNewest));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/audio"));
        assert_eq!(config.receive_timeout, Duration::from_millis(250));
        assert_eq!(config.max_chunk_size, 1024);
        assert_eq!(config.registry.overflow_policy, OverflowPolicy::DropNewest);
    }
}
