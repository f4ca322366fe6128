//! Tendermint / Cosmos SDK client library.
//!
//! Builds, signs and broadcasts transactions with per-account sequence
//! management, queries the node over JSON-RPC (including gRPC methods routed
//! through `abci_query`), and multiplexes event subscriptions over one
//! websocket.

pub mod accounts;
pub mod client;
pub mod config;
pub mod error;
pub mod keys;
pub mod observability;
pub mod query;
pub mod resilience;
pub mod rpc;
pub mod tx;
pub mod ws;

pub use client::Client;
pub use config::schema::ClientConfig;
pub use error::{SdkError, SdkResult};
pub use tx::{BaseTx, BroadcastMode, Msg, MsgRef, ResultTx};
