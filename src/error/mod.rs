//! Error taxonomy for the client.
//!
//! # Data Flow
//! ```text
//! node response (codespace, code, log) ─┐
//! client-side validation ───────────────┼──▶ SdkError ──▶ caller branches on (codespace, code)
//! transport / key / encoding failures ──┘
//! ```
//!
//! # Design Decisions
//! - Every variant maps to a stable `(codespace, code)` pair
//! - Errors reported by the node keep the node's pair verbatim
//! - Wrapping adds context but never changes the pair of the inner error

pub mod registry;

use thiserror::Error;

pub use registry::{ErrorRegistry, RegistryError};

/// Codespace used by the Cosmos SDK root module.
pub const ROOT_CODESPACE: &str = "sdk";

/// Codespace for failures detected inside this client.
pub const CLIENT_CODESPACE: &str = "client";

/// Root codespace: "invalid sequence".
pub const CODE_INVALID_SEQUENCE: u32 = 3;
/// Root codespace: "tx too large".
pub const CODE_TX_TOO_LARGE: u32 = 21;
/// Root codespace: "incorrect account sequence".
pub const CODE_WRONG_SEQUENCE: u32 = 32;

/// Client codespace codes.
pub mod codes {
    pub const INTERNAL: u32 = 1;
    pub const MISSING_CHAIN_ID: u32 = 2;
    pub const INVALID_ADDRESS: u32 = 3;
    pub const EMPTY_MESSAGES: u32 = 4;
    pub const INVALID_MESSAGE: u32 = 5;
    pub const INVALID_FEE: u32 = 6;
    pub const KEY: u32 = 7;
    pub const ENCODING: u32 = 8;
    pub const TRANSPORT: u32 = 9;
    pub const CONFIG: u32 = 10;
    pub const WEBSOCKET: u32 = 11;
    pub const SUBSCRIPTION: u32 = 12;
    pub const SIMULATION: u32 = 13;
}

/// Errors surfaced by every public operation of the client.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The factory was used without a chain ID.
    #[error("chain ID is not set")]
    MissingChainId,

    /// A bech32 address could not be parsed.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Nothing to put in a transaction.
    #[error("at least one message is required")]
    EmptyMessages,

    /// A message failed its own basic validation.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Fee or gas price parameters are malformed or conflicting.
    #[error("invalid fee: {0}")]
    InvalidFee(String),

    /// Key lookup, password check or signing failed.
    #[error("key error: {0}")]
    Key(String),

    /// Wire or JSON encoding/decoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// HTTP/JSON-RPC transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Simulation returned no usable gas estimate.
    #[error("simulation failed: {0}")]
    Simulation(String),

    /// The signed transaction exceeds the node's size limit.
    #[error("tx too large: {size} bytes exceeds limit of {max} bytes")]
    TxTooLarge { size: usize, max: usize },

    /// Error returned by the node (CheckTx, DeliverTx or query).
    #[error("[{codespace}:{code}] {log}")]
    Chain {
        codespace: String,
        code: u32,
        log: String,
    },

    /// Websocket connection failure.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Subscription bookkeeping failure.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// An inner error with accumulated context.
    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<SdkError>,
    },
}

/// Result type for client operations.
pub type SdkResult<T> = Result<T, SdkError>;

impl SdkError {
    /// Build an error reported by the node.
    pub fn chain(codespace: impl Into<String>, code: u32, log: impl Into<String>) -> Self {
        Self::Chain {
            codespace: codespace.into(),
            code,
            log: log.into(),
        }
    }

    /// Attach human-readable context while keeping the inner code.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        Self::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context layers.
    pub fn root(&self) -> &SdkError {
        match self {
            Self::Wrapped { source, .. } => source.root(),
            other => other,
        }
    }

    /// Codespace of the innermost error.
    pub fn codespace(&self) -> &str {
        match self.root() {
            Self::Chain { codespace, .. } => codespace,
            Self::TxTooLarge { .. } => ROOT_CODESPACE,
            _ => CLIENT_CODESPACE,
        }
    }

    /// Code of the innermost error.
    pub fn code(&self) -> u32 {
        match self.root() {
            Self::MissingChainId => codes::MISSING_CHAIN_ID,
            Self::InvalidAddress { .. } => codes::INVALID_ADDRESS,
            Self::EmptyMessages => codes::EMPTY_MESSAGES,
            Self::InvalidMessage(_) => codes::INVALID_MESSAGE,
            Self::InvalidFee(_) => codes::INVALID_FEE,
            Self::Key(_) => codes::KEY,
            Self::Encoding(_) => codes::ENCODING,
            Self::Transport(_) => codes::TRANSPORT,
            Self::Config(_) => codes::CONFIG,
            Self::Simulation(_) => codes::SIMULATION,
            Self::TxTooLarge { .. } => CODE_TX_TOO_LARGE,
            Self::Chain { code, .. } => *code,
            Self::WebSocket(_) => codes::WEBSOCKET,
            Self::Subscription(_) => codes::SUBSCRIPTION,
            Self::Wrapped { .. } => codes::INTERNAL,
        }
    }

    /// True for "wrong sequence" / "invalid sequence" reported by the node.
    pub fn is_sequence_mismatch(&self) -> bool {
        self.codespace() == ROOT_CODESPACE
            && matches!(self.code(), CODE_WRONG_SEQUENCE | CODE_INVALID_SEQUENCE)
    }

    /// True when the transaction exceeded the size limit, locally or on the node.
    pub fn is_tx_too_large(&self) -> bool {
        self.codespace() == ROOT_CODESPACE && self.code() == CODE_TX_TOO_LARGE
    }
}

impl From<RegistryError> for SdkError {
    fn from(e: RegistryError) -> Self {
        Self::Config(format!("error registry: {}", e))
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<prost::DecodeError> for SdkError {
    fn from(e: prost::DecodeError) -> Self {
        Self::Encoding(format!("protobuf decode: {}", e))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SdkError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_error_keeps_node_code() {
        let err = SdkError::chain("sdk", 32, "account sequence mismatch, expected 5, got 4");
        assert_eq!(err.codespace(), "sdk");
        assert_eq!(err.code(), 32);
        assert!(err.is_sequence_mismatch());
        assert!(err.to_string().contains("expected 5"));
    }

    #[test]
    fn test_wrap_preserves_innermost_code() {
        let err = SdkError::chain("sdk", 3, "invalid sequence")
            .wrap("broadcast failed")
            .wrap("attempt 3");
        assert_eq!(err.code(), CODE_INVALID_SEQUENCE);
        assert!(err.is_sequence_mismatch());
        assert_eq!(err.to_string(), "attempt 3: broadcast failed: [sdk:3] invalid sequence");
    }

    #[test]
    fn test_local_size_error_matches_node_code() {
        let err = SdkError::TxTooLarge { size: 2048, max: 1024 };
        assert_eq!(err.codespace(), ROOT_CODESPACE);
        assert!(err.is_tx_too_large());
        assert!(!err.is_sequence_mismatch());
    }

    #[test]
    fn test_client_errors_use_client_codespace() {
        let err = SdkError::MissingChainId;
        assert_eq!(err.codespace(), CLIENT_CODESPACE);
        assert_eq!(err.code(), codes::MISSING_CHAIN_ID);

        // same code in another codespace is not a sequence error
        let err = SdkError::chain("bank", 32, "other");
        assert!(!err.is_sequence_mismatch());
    }
}
