//! RingKV CLI Client
//!
//! One-shot requests against a storage node.

use clap::{Parser, Subcommand};
use ringkv::protocol::{ClientMessage, Framing};
use ringkv::KvClient;

/// RingKV CLI
#[derive(Parser, Debug)]
#[command(name = "ringkv-cli")]
#[command(about = "CLI for the RingKV key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:20010")]
    server: String,

    /// Use the plain-text framing instead of the length-delimited one
    #[arg(long)]
    text: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Store a value (`null` deletes)
    Put {
        /// The key to set
        key: String,

        /// The value; multiple words are joined with single spaces
        #[arg(required = true)]
        value: Vec<String>,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Show which node owns which hash range
    Keyrange,
}

fn main() {
    let args = Args::parse();

    let framing = if args.text {
        Framing::External
    } else {
        Framing::Internal
    };

    let mut client = match KvClient::connect(&args.server) {
        Ok(c) => c.with_framing(framing),
        Err(e) => {
            eprintln!("Failed to connect to {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    let request = match args.command {
        Commands::Get { key } => ClientMessage::get(key),
        Commands::Put { key, value } => ClientMessage::put(key, value.join(" ")),
        Commands::Del { key } => ClientMessage::delete(key),
        Commands::Keyrange => ClientMessage::keyrange(),
    };

    match client.send(&request) {
        Ok(response) => {
            let mut line = response.status.to_string();
            for part in [&response.key, &response.value].into_iter().flatten() {
                line.push(' ');
                line.push_str(part);
            }
            println!("{}", line);
        }
        Err(e) => {
            eprintln!("Request failed: {}", e);
            std::process::exit(1);
        }
    }
}
