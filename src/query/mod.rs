//! Query seams between the transaction pipeline and the node.
//!
//! # Responsibilities
//! - `ChainQuerier`: account lookup and simulation (used by the cache and factory)
//! - `TxBroadcaster`: submit signed bytes in a broadcast mode
//! - `TxQuery`: build tendermint event queries for `tx_search` and subscriptions
//!
//! # Design Decisions
//! - The pipeline depends on these traits, not on the JSON-RPC client, so it can
//!   be driven by in-process fakes in tests

use std::fmt;

use async_trait::async_trait;

use crate::error::SdkResult;
use crate::tx::{BroadcastMode, ResultTx};

/// Account state relevant to signing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BaseAccount {
    pub address: String,
    pub account_number: u64,
    /// Next sequence to use.
    pub sequence: u64,
    pub pubkey: Option<cosmrs::Any>,
}

/// Gas reported by a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GasInfo {
    pub gas_wanted: u64,
    pub gas_used: u64,
}

#[async_trait]
pub trait ChainQuerier: Send + Sync {
    async fn query_account(&self, address: &str) -> SdkResult<BaseAccount>;

    /// Simulate encoded `TxRaw` bytes.
    async fn simulate(&self, tx_bytes: Vec<u8>) -> SdkResult<GasInfo>;
}

#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    /// Submit signed `TxRaw` bytes. A non-zero result code is returned as an error.
    async fn broadcast_tx(&self, tx_bytes: Vec<u8>, mode: BroadcastMode) -> SdkResult<ResultTx>;
}

/// Tendermint event query, e.g. `tm.event='Tx' AND message.sender='cosmos1...'`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxQuery {
    conditions: Vec<String>,
}

impl TxQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query matching a tendermint event type (`NewBlock`, `Tx`, ...).
    pub fn event(kind: &str) -> Self {
        Self::new().eq("tm.event", kind)
    }

    pub fn eq(self, key: &str, value: impl fmt::Display) -> Self {
        self.push(key, "=", &quote(value))
    }

    pub fn gt(self, key: &str, value: i64) -> Self {
        self.push(key, ">", &value.to_string())
    }

    pub fn gte(self, key: &str, value: i64) -> Self {
        self.push(key, ">=", &value.to_string())
    }

    pub fn lt(self, key: &str, value: i64) -> Self {
        self.push(key, "<", &value.to_string())
    }

    pub fn lte(self, key: &str, value: i64) -> Self {
        self.push(key, "<=", &value.to_string())
    }

    pub fn contains(self, key: &str, value: &str) -> Self {
        self.push(key, " CONTAINS ", &quote(value))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn push(mut self, key: &str, op: &str, value: &str) -> Self {
        self.conditions.push(format!("{}{}{}", key, op, value));
        self
    }
}

fn quote(value: impl fmt::Display) -> String {
    format!("'{}'", value.to_string().replace('\'', "\\'"))
}

impl fmt::Display for TxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.conditions.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let q = TxQuery::event("Tx")
            .eq("message.sender", "cosmos1abc")
            .gte("tx.height", 10);
        assert_eq!(q.to_string(), "tm.event='Tx' AND message.sender='cosmos1abc' AND tx.height>=10");
    }

    #[test]
    fn test_contains_and_quoting() {
        let q = TxQuery::new().contains("transfer.recipient", "o'brien");
        assert_eq!(q.to_string(), "transfer.recipient CONTAINS 'o\\'brien'");
        assert!(TxQuery::new().is_empty());
    }
}
