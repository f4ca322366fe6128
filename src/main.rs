//! `tm-client`: command-line access to a Tendermint / Cosmos node.
//!
//! ```text
//! tm-client [--config client.toml] [--node http://host:26657] <command>
//!
//!   status                     node info and sync state
//!   account <address>          account number and sequence
//!   tx <hash>                  transaction by hash
//!   search <query>             tx_search, e.g. "message.sender='cosmos1...'"
//!   subscribe <query>          stream events as JSON lines
//!   keys add|recover|show|export
//! ```
//!
//! Keys live in memory for the duration of one command, so `keys` subcommands
//! take their key material on the command line and print the derived result.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;

use tm_client::config::{load_config, ClientConfig};
use tm_client::keys::KeyAlgo;
use tm_client::observability::{logging, metrics};
use tm_client::query::TxQuery;
use tm_client::Client;

#[derive(Parser)]
#[command(name = "tm-client")]
#[command(about = "Query, subscribe and manage keys against a Tendermint node", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RPC address, overrides `node.rpc_address`.
    #[arg(short, long)]
    node: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Node status
    Status,
    /// Account number and sequence
    Account { address: String },
    /// Transaction by hash
    Tx { hash: String },
    /// Search transactions by event query
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 30)]
        per_page: u32,
    },
    /// Stream events for a query
    Subscribe {
        query: String,
        /// Stop after this many events.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Key management
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate a random key and print it with its private key
    Add {
        name: String,
        #[arg(long, default_value = "secp256k1")]
        algo: KeyAlgo,
    },
    /// Derive a key from a BIP-39 mnemonic
    Recover {
        name: String,
        #[arg(long)]
        mnemonic: String,
        #[arg(long)]
        hd_path: Option<String>,
        #[arg(long, default_value = "secp256k1")]
        algo: KeyAlgo,
    },
    /// Show address and public key for a hex private key
    Show {
        #[arg(long)]
        private_key: String,
        #[arg(long, default_value = "secp256k1")]
        algo: KeyAlgo,
    },
    /// Print the hex private key derived from a mnemonic
    Export {
        #[arg(long)]
        mnemonic: String,
        #[arg(long)]
        hd_path: Option<String>,
        #[arg(long, default_value = "secp256k1")]
        algo: KeyAlgo,
    },
}

const CLI_PASSWORD: &str = "tm-client";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(node) = cli.node {
        config.node.rpc_address = node;
    }

    logging::init_logging(&config.observability.log_level);
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let default_hd_path = config.keys.hd_path.clone();
    let client = Client::new(config)?;

    match cli.command {
        Commands::Status => print_json(&serde_json::to_value(client.status().await?)?)?,
        Commands::Account { address } => {
            let account = client.query_account(&address).await?;
            print_json(&json!({
                "address": account.address,
                "account_number": account.account_number,
                "sequence": account.sequence,
                "pubkey_type": account.pubkey.map(|pk| pk.type_url),
            }))?;
        }
        Commands::Tx { hash } => print_json(&serde_json::to_value(client.query_tx(&hash).await?)?)?,
        Commands::Search { query, page, per_page } => {
            let result = client.rpc().tx_search(&query, page, per_page, "asc").await?;
            print_json(&serde_json::to_value(result)?)?;
        }
        Commands::Subscribe { query, limit } => subscribe(&client, &query, limit).await?,
        Commands::Keys { command } => keys(&client, command, default_hd_path)?,
    }

    client.close();
    Ok(())
}

async fn subscribe(client: &Client, query: &str, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let mut sub = client.subscribe(query).await?;
    tracing::info!(query = %query, subscriber = %sub.id, "Streaming events, Ctrl-C to stop");

    let mut seen = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = sub.next() => {
                let Some(event) = event else { break };
                println!("{}", json!({ "query": event.query, "data": event.data, "events": event.events }));
                seen += 1;
                if limit.is_some_and(|l| seen >= l) {
                    break;
                }
            }
        }
    }

    client.unsubscribe(query).await.ok();
    Ok(())
}

fn keys(client: &Client, command: KeyCommands, default_hd_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let keys = client.keys();
    match command {
        KeyCommands::Add { name, algo } => {
            let info = keys.add(&name, CLI_PASSWORD, algo)?;
            let mut out = info.to_json();
            out["private_key"] = json!(keys.export(&name, CLI_PASSWORD)?);
            print_json(&out)?;
        }
        KeyCommands::Recover { name, mnemonic, hd_path, algo } => {
            let hd_path = hd_path.or(default_hd_path);
            let info = keys.recover(&name, CLI_PASSWORD, &mnemonic, algo, hd_path.as_deref())?;
            print_json(&info.to_json())?;
        }
        KeyCommands::Show { private_key, algo } => {
            let info = keys.import("imported", CLI_PASSWORD, algo, &private_key)?;
            print_json(&info.to_json())?;
        }
        KeyCommands::Export { mnemonic, hd_path, algo } => {
            let hd_path = hd_path.or(default_hd_path);
            keys.recover("exported", CLI_PASSWORD, &mnemonic, algo, hd_path.as_deref())?;
            print_json(&json!({ "private_key": keys.export("exported", CLI_PASSWORD)? }))?;
        }
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
