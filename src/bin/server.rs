//! RingKV Storage Node Binary
//!
//! Starts a storage node, optionally registering with an orchestrator.

use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use ringkv::cache::CacheStrategy;
use ringkv::{NodeConfig, NodeServer};
use tracing_subscriber::{fmt, EnvFilter};

/// RingKV storage node
#[derive(Parser, Debug)]
#[command(name = "ringkv-server")]
#[command(about = "Storage node for the RingKV partitioned key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./ringkv_data")]
    data_dir: String,

    /// Listen address (host:port); also the node's ring identity
    #[arg(short, long, default_value = "127.0.0.1:20010")]
    listen: String,

    /// Orchestrator control address; omit to run standalone
    #[arg(short, long)]
    orchestrator: Option<String>,

    /// Cache capacity in entries
    #[arg(short = 'c', long, default_value = "10")]
    cache_size: usize,

    /// Cache strategy (LRU, LFU, FIFO, None)
    #[arg(short, long, default_value = "FIFO")]
    strategy: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ringkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let strategy = match CacheStrategy::from_str(&args.strategy) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    tracing::info!("RingKV Server v{}", ringkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    let mut builder = NodeConfig::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .cache(strategy, args.cache_size)
        .max_connections(args.max_connections);
    if let Some(addr) = &args.orchestrator {
        tracing::info!("Orchestrator: {}", addr);
        builder = builder.orchestrator_addr(addr);
    }

    let server = match NodeServer::open(builder.build()) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to start node: {}", e);
            std::process::exit(1);
        }
    };

    // Ctrl-C leaves the cluster, handing buffered pairs to the orchestrator
    let handler_server = Arc::clone(&server);
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Interrupt received, leaving the cluster");
        handler_server.shutdown();
    }) {
        tracing::warn!("Failed to install interrupt handler: {}", e);
    }

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        server.shutdown();
        std::process::exit(1);
    }

    server.shutdown();
    tracing::info!("Server stopped");
}
