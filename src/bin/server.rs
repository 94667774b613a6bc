//! Stowage Server Binary
//!
//! Starts the in-memory reference storage service.

use std::sync::Arc;

use clap::Parser;
use stowage::network::Server;
use stowage::store::MemoryStore;
use stowage::ServerConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Stowage reference storage server
#[derive(Parser, Debug)]
#[command(name = "stowage-server")]
#[command(about = "In-memory object storage service speaking the stowage wire protocol")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = stowage::config::DEFAULT_ADDR)]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Idle read timeout per connection in milliseconds (0 = none)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stowage=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Stowage Server v{}", stowage::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let config = ServerConfig::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .read_timeout_ms(args.read_timeout_ms)
        .build();

    let server = match Server::bind(config, Arc::new(MemoryStore::new())) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", args.listen, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
