//! Transaction-level types shared by the factory, broadcaster and RPC layer.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};
use crate::tx::sign_mode::SignMode;

/// How long `broadcast_tx_*` waits before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// Return after CheckTx.
    #[default]
    Sync,
    /// Return immediately.
    Async,
    /// Return after the block containing the tx is committed.
    Commit,
}

impl BroadcastMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastMode::Sync => "sync",
            BroadcastMode::Async => "async",
            BroadcastMode::Commit => "commit",
        }
    }

    /// JSON-RPC method name.
    pub fn rpc_method(&self) -> &'static str {
        match self {
            BroadcastMode::Sync => "broadcast_tx_sync",
            BroadcastMode::Async => "broadcast_tx_async",
            BroadcastMode::Commit => "broadcast_tx_commit",
        }
    }
}

impl fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BroadcastMode {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(BroadcastMode::Sync),
            "async" => Ok(BroadcastMode::Async),
            "commit" | "block" => Ok(BroadcastMode::Commit),
            other => Err(SdkError::Config(format!("unknown broadcast mode '{}'", other))),
        }
    }
}

/// Per-call transaction parameters. Empty or zero fields fall back to the
/// client's `[tx]` defaults.
#[derive(Debug, Clone, Default)]
pub struct BaseTx {
    /// Key name in the key manager.
    pub from: String,
    pub password: String,
    pub gas: u64,
    /// Flat fee, e.g. "5000uatom".
    pub fee: String,
    /// Gas prices, e.g. "0.025uatom".
    pub gas_prices: String,
    pub fee_granter: String,
    pub fee_payer: String,
    pub memo: String,
    pub mode: Option<BroadcastMode>,
    /// Simulate first and replace `gas` with the adjusted estimate.
    pub simulate_and_execute: bool,
    pub gas_adjustment: f64,
    pub timeout_height: u64,
    pub sign_mode: Option<SignMode>,
}

impl BaseTx {
    pub fn new(from: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            password: password.into(),
            ..Default::default()
        }
    }
}

/// A single `key=value` attribute of an ABCI event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub index: bool,
}

/// An ABCI event emitted while executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AbciEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl AbciEvent {
    /// First value of attribute `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// Outcome of a successful broadcast. Failures travel as `SdkError`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultTx {
    /// Uppercase hex tx hash.
    pub hash: String,
    pub height: i64,
    pub gas_wanted: i64,
    pub gas_used: i64,
    /// Raw result data (base64 on the wire).
    pub data: String,
    pub events: Vec<AbciEvent>,
}

/// A transaction message.
///
/// Implemented by per-module message types; the client only needs the
/// protobuf `Any` form and, for amino signing, the legacy JSON form.
pub trait Msg: Send + Sync + fmt::Debug {
    /// Protobuf type URL, e.g. "/cosmos.bank.v1beta1.MsgSend".
    fn type_url(&self) -> String;

    /// Protobuf `Any` placed in `TxBody.messages`.
    fn to_any(&self) -> SdkResult<cosmrs::Any>;

    /// Stateless checks run before anything is signed.
    fn validate_basic(&self) -> SdkResult<()> {
        Ok(())
    }

    /// Legacy amino JSON `{"type": ..., "value": ...}` for `SIGN_MODE_LEGACY_AMINO_JSON`.
    fn amino_json(&self) -> SdkResult<serde_json::Value> {
        Err(SdkError::InvalidMessage(format!(
            "{} has no amino JSON encoding",
            self.type_url()
        )))
    }
}

/// Shared message handle. Batches are sliced and retried without copying messages.
pub type MsgRef = Arc<dyn Msg>;

impl Msg for cosmrs::Any {
    fn type_url(&self) -> String {
        self.type_url.clone()
    }

    fn to_any(&self) -> SdkResult<cosmrs::Any> {
        Ok(self.clone())
    }

    fn validate_basic(&self) -> SdkResult<()> {
        if !self.type_url.starts_with('/') {
            return Err(SdkError::InvalidMessage(format!(
                "type URL '{}' must start with '/'",
                self.type_url
            )));
        }
        Ok(())
    }
}

/// A pre-encoded message that also carries its amino JSON form.
#[derive(Debug, Clone)]
pub struct AminoMsg {
    pub any: cosmrs::Any,
    /// Amino type name, e.g. "cosmos-sdk/MsgSend".
    pub amino_type: String,
    pub value: serde_json::Value,
}

impl Msg for AminoMsg {
    fn type_url(&self) -> String {
        self.any.type_url.clone()
    }

    fn to_any(&self) -> SdkResult<cosmrs::Any> {
        Ok(self.any.clone())
    }

    fn validate_basic(&self) -> SdkResult<()> {
        self.any.validate_basic()?;
        if self.amino_type.is_empty() {
            return Err(SdkError::InvalidMessage("amino type must not be empty".into()));
        }
        Ok(())
    }

    fn amino_json(&self) -> SdkResult<serde_json::Value> {
        Ok(serde_json::json!({ "type": self.amino_type, "value": self.value }))
    }
}
