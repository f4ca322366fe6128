//! JSON-RPC envelopes and tendermint result types.
//!
//! Tendermint encodes 64-bit integers as strings and omits or nulls empty
//! fields, so most numeric fields accept either form and most collections
//! accept `null`.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};

use crate::tx::AbciEvent;

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

impl<'a, P: Serialize> RpcRequest<'a, P> {
    pub fn new(id: u64, method: &'a str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Deserialize)]
pub struct RpcResponse<R> {
    #[serde(default)]
    pub id: serde_json::Value,
    pub result: Option<R>,
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

impl std::fmt::Display for RpcErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            Some(data) if !data.is_empty() => write!(f, "RPC error {}: {} ({})", self.code, self.message, data),
            _ => write!(f, "RPC error {}: {}", self.code, self.message),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNum {
    Str(String),
    Num(i64),
}

/// Accept `"123"`, `123` or `""`.
pub fn de_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Option::<StrOrNum>::deserialize(d)? {
        None => Ok(0),
        Some(StrOrNum::Num(n)) => Ok(n),
        Some(StrOrNum::Str(s)) if s.is_empty() => Ok(0),
        Some(StrOrNum::Str(s)) => s.parse().map_err(D::Error::custom),
    }
}

pub fn de_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let n = de_i64(d)?;
    u64::try_from(n).map_err(D::Error::custom)
}

/// `null` → `T::default()`.
pub fn de_null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// `abci_query` result wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct AbciQueryResult {
    pub response: AbciQueryResponse,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AbciQueryResponse {
    #[serde(default)]
    pub code: u32,
    #[serde(default, deserialize_with = "de_null_default")]
    pub log: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub info: String,
    /// Base64.
    #[serde(default, deserialize_with = "de_null_default")]
    pub value: String,
    #[serde(default, deserialize_with = "de_i64")]
    pub height: i64,
    #[serde(default, deserialize_with = "de_null_default")]
    pub codespace: String,
}

/// CheckTx / DeliverTx / ExecTxResult.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TxResultData {
    #[serde(default)]
    pub code: u32,
    #[serde(default, deserialize_with = "de_null_default")]
    pub data: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub log: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub info: String,
    #[serde(default, deserialize_with = "de_i64")]
    pub gas_wanted: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub gas_used: i64,
    #[serde(default, deserialize_with = "de_null_default")]
    pub events: Vec<AbciEvent>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub codespace: String,
}

/// `broadcast_tx_sync` / `broadcast_tx_async` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BroadcastTxResult {
    #[serde(default)]
    pub code: u32,
    #[serde(default, deserialize_with = "de_null_default")]
    pub data: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub log: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub codespace: String,
    pub hash: String,
}

/// `broadcast_tx_commit` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BroadcastTxCommitResult {
    #[serde(default)]
    pub check_tx: TxResultData,
    /// `tx_result` since CometBFT 0.38.
    #[serde(default, alias = "tx_result")]
    pub deliver_tx: TxResultData,
    pub hash: String,
    #[serde(default, deserialize_with = "de_i64")]
    pub height: i64,
}

/// `tx` result.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TxResponse {
    pub hash: String,
    #[serde(default, deserialize_with = "de_i64")]
    pub height: i64,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub tx_result: TxResultData,
    /// Base64 `TxRaw`.
    #[serde(default)]
    pub tx: String,
}

/// `tx_search` result.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TxSearchResult {
    #[serde(default, deserialize_with = "de_null_default")]
    pub txs: Vec<TxResponse>,
    #[serde(default, deserialize_with = "de_u64")]
    pub total_count: u64,
}

/// `status` result.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatusResult {
    pub node_info: NodeInfo,
    pub sync_info: SyncInfo,
    #[serde(default)]
    pub validator_info: ValidatorInfo,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub listen_addr: String,
    /// Chain ID.
    pub network: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub moniker: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SyncInfo {
    #[serde(default)]
    pub latest_block_hash: String,
    #[serde(default)]
    pub latest_app_hash: String,
    #[serde(default, deserialize_with = "de_i64")]
    pub latest_block_height: i64,
    #[serde(default)]
    pub latest_block_time: String,
    #[serde(default)]
    pub catching_up: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ValidatorInfo {
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "de_i64")]
    pub voting_power: i64,
}
