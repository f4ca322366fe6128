//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → owned by Client, pieces cloned into each component
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - `BaseTx` fields override `[tx]` defaults per call

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::{AccountsConfig, KeysConfig, NodeConfig, ObservabilityConfig, TxDefaults, WebSocketConfig};

/// Resolve the websocket endpoint, defaulting to `/websocket` on the RPC host.
pub fn websocket_url(node: &NodeConfig) -> Result<url::Url, crate::error::SdkError> {
    if let Some(ws) = &node.ws_address {
        return url::Url::parse(ws)
            .map_err(|e| crate::error::SdkError::Config(format!("invalid ws_address '{}': {}", ws, e)));
    }

    let mut url = url::Url::parse(&node.rpc_address).map_err(|e| {
        crate::error::SdkError::Config(format!("invalid rpc_address '{}': {}", node.rpc_address, e))
    })?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| crate::error::SdkError::Config("cannot derive websocket scheme".into()))?;
    url.set_path("/websocket");
    Ok(url)
}
