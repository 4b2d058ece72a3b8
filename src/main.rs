//! CLI entry point: parse args, load configuration, start the node,
//! and run either a one-shot `get`/`set` or a long-lived listener.
//!
//! Feynman: this is the ignition key. Everything interesting already
//! lives in the library; main's job is to wire up logging, read the
//! config file, and decide when to stop.

use bitdht::node::Node;
use bitdht::protocol::message::Value;
use bitdht::{Contact, Error, NodeId, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "bitdht", author, version, about = "Kademlia DHT node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file; missing file means defaults.
    #[arg(short, long, default_value = "~/.bitdht/config.toml")]
    config: String,

    /// tracing-subscriber EnvFilter directive, e.g. "info" or "bitdht=debug"
    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the node and run until interrupted.
    Start {
        /// Bootstrap peer addresses, "ip:port", may repeat.
        #[arg(long = "bootstrap")]
        bootstrap: Vec<SocketAddr>,
    },
    /// Store a value under a key and exit.
    Set {
        key: String,
        value: String,
        /// One of: int, float, bool, string, bytes (hex-encoded).
        #[arg(long = "type", default_value = "string")]
        value_type: String,
        #[arg(long = "bootstrap")]
        bootstrap: Vec<SocketAddr>,
    },
    /// Fetch a value by key and print it.
    Get {
        key: String,
        #[arg(long = "bootstrap")]
        bootstrap: Vec<SocketAddr>,
    },
}

fn parse_value(value_type: &str, raw: &str) -> Result<Value> {
    match value_type {
        "int" => raw
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| Error::InvalidValueType(format!("not an int: {e}"))),
        "float" => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| Error::InvalidValueType(format!("not a float: {e}"))),
        "bool" => raw
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|e| Error::InvalidValueType(format!("not a bool: {e}"))),
        "string" => Ok(Value::String(raw.to_string())),
        "bytes" => hex::decode(raw)
            .map(Value::Bytes)
            .map_err(|e| Error::InvalidValueType(format!("not valid hex: {e}"))),
        other => Err(Error::InvalidValueType(format!(
            "unrecognized value type {other:?}; expected int, float, bool, string, or bytes"
        ))),
    }
}

fn print_value(value: &Value) {
    match value {
        Value::Int(v) => println!("{v}"),
        Value::Float(v) => println!("{v}"),
        Value::Bool(v) => println!("{v}"),
        Value::String(v) => println!("{v}"),
        Value::Bytes(v) => println!("{}", hex::encode(v)),
    }
}

async fn bootstrap_seeds(node: &Node, addrs: Vec<SocketAddr>) -> Result<()> {
    let seeds = addrs
        .into_iter()
        .map(|addr| Contact::new(NodeId::random(), addr))
        .collect();
    node.bootstrap(seeds).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    use tracing_subscriber::{fmt, EnvFilter};
    fmt().with_env_filter(EnvFilter::new(&cli.verbosity)).init();

    let config_path = shellexpand(&cli.config);
    let config = bitdht::config::Config::load(&config_path)?;

    let node = Arc::new(Node::new(config).await?);
    let (listen_handle, maintenance_handle) = node.start();
    tracing::info!(node_id = %node.local_id(), addr = ?node.local_addr(), "node started");

    match cli.command {
        Commands::Start { bootstrap } => {
            bootstrap_seeds(&node, bootstrap).await?;
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
            listen_handle.abort();
            maintenance_handle.abort();
            node.shutdown().await?;
        }
        Commands::Set {
            key,
            value,
            value_type,
            bootstrap,
        } => {
            let value = parse_value(&value_type, &value)?;
            bootstrap_seeds(&node, bootstrap).await?;
            let ok = node.set(key.as_bytes(), value).await?;
            listen_handle.abort();
            maintenance_handle.abort();
            node.shutdown().await?;
            if !ok {
                eprintln!("set failed: no reachable neighbors");
                std::process::exit(1);
            }
        }
        Commands::Get { key, bootstrap } => {
            bootstrap_seeds(&node, bootstrap).await?;
            let found = node.get(key.as_bytes()).await;
            listen_handle.abort();
            maintenance_handle.abort();
            node.shutdown().await?;
            match found {
                Some(value) => print_value(&value),
                None => {
                    eprintln!("not found");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn shellexpand(path: &str) -> std::path::PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    std::path::PathBuf::from(path)
}
