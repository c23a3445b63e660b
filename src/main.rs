//! Audio relay server binary
//!
//! ```text
//! curl -X POST localhost:5000/stream/start/lobby
//! curl -X POST --data-binary @chunk.mp3 localhost:5000/stream/data/lobby
//! curl localhost:5000/stream/listen/lobby > live.mp3
//! curl -X POST localhost:5000/stream/stop/lobby
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use audio_relay::{OverflowPolicy, RegistryConfig, RelayServer, ServerConfig};
use clap::Parser;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0:5000", env = "RELAY_BIND")]
    bind: SocketAddr,

    /// Port override for the bind address
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Directory recordings are written to and served from
    #[arg(long, default_value = "recordings", env = "RELAY_STORAGE_DIR")]
    storage_dir: PathBuf,

    /// Milliseconds a listener waits for data before re-checking its stream
    #[arg(long, default_value_t = 1000, env = "RELAY_RECEIVE_TIMEOUT_MS")]
    receive_timeout_ms: u64,

    /// Maximum chunks queued per listener (bounded policies only)
    #[arg(long, default_value_t = 1024, env = "RELAY_QUEUE_CAPACITY")]
    queue_capacity: usize,

    /// Full listener queue behaviour: unbounded, drop-oldest or drop-newest
    #[arg(long, default_value = "unbounded", env = "RELAY_OVERFLOW_POLICY")]
    overflow_policy: OverflowPolicy,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_relay=info,tower_http=info".into()),
        )
        .init();

    let mut bind_addr = args.bind;
    if let Some(port) = args.port {
        bind_addr.set_port(port);
    }

    let config = ServerConfig::with_addr(bind_addr)
        .storage_dir(args.storage_dir)
        .receive_timeout(Duration::from_millis(args.receive_timeout_ms))
        .registry(
            RegistryConfig::default()
                .listener_queue_capacity(args.queue_capacity)
                .overflow_policy(args.overflow_policy),
        );

    let server = RelayServer::new(config);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
