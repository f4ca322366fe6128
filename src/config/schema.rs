//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::tx::BroadcastMode;

/// Account cache entry lifetime.
pub const ACCOUNT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Number of lock shards for per-account serialization.
pub const DEFAULT_LOCK_SHARDS: usize = 16;

/// Maximum number of messages per transaction in `send_batch`.
pub const MAX_BATCH: usize = 100;

/// Build attempts before a sequence mismatch is surfaced.
pub const TRY_THRESHOLD: u32 = 3;

/// Root configuration for the client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Node endpoints.
    pub node: NodeConfig,

    /// Transaction defaults applied when a `BaseTx` leaves a field empty.
    pub tx: TxDefaults,

    /// Key manager settings.
    pub keys: KeysConfig,

    /// Account cache and locking.
    pub accounts: AccountsConfig,

    /// Websocket event client.
    pub websocket: WebSocketConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Node endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Tendermint RPC address (e.g., "http://localhost:26657").
    pub rpc_address: String,

    /// Websocket address. Defaults to `/websocket` on the RPC host.
    pub ws_address: Option<String>,

    /// gRPC address. Queries are routed through `abci_query` using gRPC method paths.
    pub grpc_address: Option<String>,

    /// Chain ID used in every sign document.
    pub chain_id: String,

    /// HTTP request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Maximum signed transaction size accepted by the node, in bytes.
    pub max_tx_bytes: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_address: "http://localhost:26657".to_string(),
            ws_address: None,
            grpc_address: None,
            chain_id: String::new(),
            rpc_timeout_secs: 30,
            max_tx_bytes: 1_048_576,
        }
    }
}

/// Client-wide transaction defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TxDefaults {
    /// Gas limit.
    pub gas: u64,

    /// Flat fee, e.g. "5000uatom". Mutually exclusive with `gas_prices`.
    pub fee: String,

    /// Gas prices, e.g. "0.025uatom".
    pub gas_prices: String,

    /// Multiplier applied to simulated gas.
    pub gas_adjustment: f64,

    /// Broadcast mode.
    pub mode: BroadcastMode,

    /// Timeout height (0 = none).
    pub timeout_height: u64,

    /// Bech32 account prefix.
    pub bech32_prefix: String,
}

impl Default for TxDefaults {
    fn default() -> Self {
        Self {
            gas: 200_000,
            fee: String::new(),
            gas_prices: String::new(),
            gas_adjustment: 1.0,
            mode: BroadcastMode::Sync,
            timeout_height: 0,
            bech32_prefix: "cosmos".to_string(),
        }
    }
}

/// Key manager settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Default key algorithm ("secp256k1" or "eth_secp256k1").
    pub algo: crate::keys::KeyAlgo,

    /// Default HD path used when recovering from a mnemonic.
    pub hd_path: Option<String>,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            algo: crate::keys::KeyAlgo::Secp256k1,
            hd_path: None,
        }
    }
}

/// Account cache and locking.
///
/// TTL, shard count, batch size and attempt ceiling are fixed by default but
/// kept in config so tests can shrink them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Account cache TTL in milliseconds.
    pub cache_ttl_ms: u64,

    /// Number of lock shards.
    pub lock_shards: usize,

    /// Messages per transaction in batch sends.
    pub max_batch: usize,

    /// Build attempts on sequence mismatch.
    pub try_threshold: u32,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: ACCOUNT_CACHE_TTL.as_millis() as u64,
            lock_shards: DEFAULT_LOCK_SHARDS,
            max_batch: MAX_BATCH,
            try_threshold: TRY_THRESHOLD,
        }
    }
}

impl AccountsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Websocket event client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Keepalive ping period in seconds (0 disables pings).
    pub ping_period_secs: u64,

    /// Maximum reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub reconnect_base_delay_ms: u64,

    /// Maximum backoff delay in milliseconds.
    pub reconnect_max_delay_ms: u64,

    /// Capacity of each subscription channel.
    pub channel_capacity: usize,

    /// Handlers of one typed subscription allowed to run at once.
    pub max_concurrent_handlers: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_period_secs: 30,
            max_reconnect_attempts: 25,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60_000,
            channel_capacity: 100,
            max_concurrent_handlers: 64,
        }
    }
}

impl WebSocketConfig {
    pub fn ping_period(&self) -> Option<Duration> {
        (self.ping_period_secs > 0).then(|| Duration::from_secs(self.ping_period_secs))
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint (CLI only).
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
