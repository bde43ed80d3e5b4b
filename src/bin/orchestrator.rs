//! RingKV Orchestrator Binary
//!
//! Runs the orchestrator and an interactive admin prompt.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use ringkv::cache::CacheStrategy;
use ringkv::config::DEFAULT_ORCHESTRATOR_PORT;
use ringkv::{ClusterOrchestrator, OrchestratorConfig, OrchestratorServer, PoolConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// RingKV orchestrator
#[derive(Parser, Debug)]
#[command(name = "ringkv-orchestrator")]
#[command(about = "Cluster orchestrator for RingKV")]
#[command(version)]
struct Args {
    /// Control listen address (host:port); overrides the pool file
    #[arg(short, long)]
    listen: Option<String>,

    /// JSON file listing pre-provisioned servers
    #[arg(short, long)]
    pool: Option<PathBuf>,

    /// How long a membership change waits for the previous rebalance (ms)
    #[arg(short, long, default_value = "5000")]
    rebalance_timeout_ms: u64,
}

const HELP: &str = "\
Commands:
  addnode <strategy> <cache-size>            admit one pooled node
  addnodes <count> <strategy> <cache-size>   admit several pooled nodes
  removenodes <host:port>...                 remove nodes from the ring
  list                                       show every known node
  ring                                       show the ring ranges
  help                                       show this text
  shutdown                                   stop accepting nodes and exit";

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ringkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let pool = match &args.pool {
        Some(path) => match PoolConfig::load(path) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!("Failed to load pool file {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => PoolConfig::default(),
    };

    let listen = args
        .listen
        .clone()
        .or_else(|| pool.orchestrator_listen_addr())
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_ORCHESTRATOR_PORT));

    tracing::info!("RingKV Orchestrator v{}", ringkv::VERSION);
    tracing::info!("{} pre-provisioned servers", pool.servers.len());

    let config = OrchestratorConfig::builder()
        .listen_addr(listen)
        .rebalance_timeout_ms(args.rebalance_timeout_ms)
        .pool(pool)
        .build();

    let server = match OrchestratorServer::bind(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start orchestrator: {}", e);
            std::process::exit(1);
        }
    };
    let orchestrator = server.orchestrator();

    let listener = thread::spawn(move || {
        if let Err(e) = server.run() {
            tracing::error!("Listener error: {}", e);
        }
    });

    admin_prompt(&orchestrator);

    orchestrator.shutdown();
    let _ = listener.join();
    tracing::info!("Orchestrator stopped");
}

fn admin_prompt(orchestrator: &Arc<ClusterOrchestrator>) {
    let stdin = io::stdin();
    println!("{}", HELP);

    loop {
        print!("ringkv> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                eprintln!("stdin: {}", e);
                return;
            }
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["addnode", strategy, size] => add_nodes(orchestrator, "1", strategy, size),
            ["addnodes", count, strategy, size] => add_nodes(orchestrator, count, strategy, size),
            ["removenodes", names @ ..] if !names.is_empty() => {
                if orchestrator.remove_nodes(names.iter()) {
                    println!("removed {}", names.join(", "));
                } else {
                    println!("some nodes were not found");
                }
            }
            ["list"] => {
                for node in orchestrator.get_nodes() {
                    let state = orchestrator
                        .node_state(&node.name)
                        .map(|s| format!("{:?}", s))
                        .unwrap_or_default();
                    let cache = node
                        .cache
                        .map(|c| format!("{} x {}", c.strategy, c.capacity))
                        .unwrap_or_else(|| "default cache".to_string());
                    println!("{}  {}  {}", node.name, cache, state);
                }
            }
            ["ring"] => {
                let ring = orchestrator.ring_snapshot();
                if ring.is_empty() {
                    println!("ring is empty");
                }
                for (range, node) in ring.key_ranges() {
                    println!("{}  {}", node.name, range);
                }
            }
            ["help"] => println!("{}", HELP),
            ["shutdown"] | ["quit"] | ["exit"] => return,
            _ => println!("unknown command; type 'help'"),
        }
    }
}

fn add_nodes(orchestrator: &ClusterOrchestrator, count: &str, strategy: &str, size: &str) {
    let parsed = (
        count.parse::<usize>(),
        CacheStrategy::from_str(strategy),
        size.parse::<usize>(),
    );
    let (count, strategy, size) = match parsed {
        (Ok(count), Ok(strategy), Ok(size)) => (count, strategy, size),
        _ => {
            println!("usage: addnodes <count> <LRU|LFU|FIFO|None> <cache-size>");
            return;
        }
    };

    match orchestrator.add_nodes(count, strategy, size) {
        Ok(added) => {
            for node in &added {
                println!("added {}", node.name);
            }
            if added.len() < count {
                println!("{} of {} nodes could not be admitted", count - added.len(), count);
            }
        }
        Err(e) => println!("error: {}", e),
    }
}
