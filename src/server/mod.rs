//! HTTP transport for the relay
//!
//! Translates HTTP requests into registry and channel operations and streams
//! listener output back to clients.

pub mod config;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use listener::RelayServer;
pub use routes::{router, AppState};
