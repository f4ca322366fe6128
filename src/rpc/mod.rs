//! JSON-RPC query layer.
//!
//! # Data Flow
//! ```text
//! Client / Broadcaster
//!     → client.rs (RpcClient: abci_query, broadcast_tx_*, tx, tx_search, status)
//!     → types.rs (envelopes, string-or-number decoding)
//!     → node HTTP endpoint
//! ```

pub mod client;
pub mod types;

pub use client::{decode_account, RpcClient, ACCOUNT_QUERY_PATH, SIMULATE_PATH};
pub use types::{
    AbciQueryResponse, BroadcastTxCommitResult, BroadcastTxResult, StatusResult, TxResponse, TxResultData,
    TxSearchResult,
};
