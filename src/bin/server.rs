//! memkv Server Binary
//!
//! Starts the TCP server for memkv.

use std::sync::Arc;

use clap::Parser;
use memkv::{Config, MemoryStore, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// memkv Server
#[derive(Parser, Debug)]
#[command(name = "memkv-server")]
#[command(about = "In-memory cache speaking the memcached binary protocol")]
#[command(version)]
struct Args {
    /// Host to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "11211")]
    port: u16,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Largest accepted request body in KB
    #[arg(short = 'b', long, default_value = "1024")]
    max_body_kb: usize,

    /// Number of store shards
    #[arg(short, long, default_value = "16")]
    shards: usize,
}

/// None if the size does not fit in a `usize`
fn kb_to_bytes(kb: usize) -> Option<usize> {
    kb.checked_mul(1024)
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,memkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("memkv Server v{}", memkv::VERSION);

    let max_body_size = match kb_to_bytes(args.max_body_kb) {
        Some(size) => size,
        None => {
            tracing::error!("Invalid configuration: --max-body-kb {} is too large", args.max_body_kb);
            std::process::exit(1);
        }
    };

    let config = match Config::builder()
        .host(&args.host)
        .port(args.port)
        .max_connections(args.max_connections)
        .max_body_size(max_body_size)
        .shard_count(args.shards)
        .build()
    {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(MemoryStore::with_shards(config.shard_count));
    tracing::info!("Store initialized with {} shards", store.shard_count());

    let server = Server::new(config, store);
    if let Err(e) = server.start() {
        tracing::error!("Failed to start server: {}", e);
        std::process::exit(1);
    }

    // Runs until the accept loop gives up or the process is killed
    server.join();

    tracing::info!("Server stopped");
}
