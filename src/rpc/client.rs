//! Tendermint JSON-RPC client over HTTP.
//!
//! # Responsibilities
//! - Issue JSON-RPC calls and check that the response id echoes the request id
//! - Turn non-zero ABCI codes into `SdkError::Chain` with the node's codespace
//! - Route gRPC method queries through `abci_query`
//!
//! # Design Decisions
//! - No built-in retry: callers decide (the broadcaster retries only on sequence errors)
//! - `broadcast_tx_commit` reports the first failed phase, CheckTx before DeliverTx

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use prost::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ErrorRegistry, SdkError, SdkResult};
use crate::query::{BaseAccount, ChainQuerier, GasInfo, TxBroadcaster};
use crate::rpc::types::*;
use crate::tx::{BroadcastMode, ResultTx};

/// gRPC path for account lookups.
pub const ACCOUNT_QUERY_PATH: &str = "/cosmos.auth.v1beta1.Query/Account";

/// gRPC path for simulation.
pub const SIMULATE_PATH: &str = "/cosmos.tx.v1beta1.Service/Simulate";

const BASE_ACCOUNT_TYPE_URL: &str = "/cosmos.auth.v1beta1.BaseAccount";

/// Account types embedding a `BaseAccount` at field 1 (module, eth accounts).
#[derive(Clone, PartialEq, prost::Message)]
struct EmbeddedBaseAccount {
    #[prost(message, optional, tag = "1")]
    base_account: Option<cosmrs::proto::cosmos::auth::v1beta1::BaseAccount>,
}

/// Vesting accounts: `BaseVestingAccount` at field 1, `BaseAccount` inside it.
#[derive(Clone, PartialEq, prost::Message)]
struct VestingAccount {
    #[prost(message, optional, tag = "1")]
    base_vesting_account: Option<EmbeddedBaseAccount>,
}

/// JSON-RPC client for one node.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    address: String,
    next_id: Arc<AtomicU64>,
    registry: Arc<ErrorRegistry>,
}

impl RpcClient {
    pub fn new(address: &str, timeout: Duration, registry: Arc<ErrorRegistry>) -> SdkResult<Self> {
        url::Url::parse(address)
            .map_err(|e| SdkError::Config(format!("invalid RPC address '{}': {}", address, e)))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        tracing::info!(rpc_address = %address, "RPC client initialized");
        Ok(Self {
            http,
            address: address.to_string(),
            next_id: Arc::new(AtomicU64::new(1)),
            registry,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Raw JSON-RPC call.
    pub async fn call<P, R>(&self, method: &str, params: P) -> SdkResult<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);

        let response = self.http.post(&self.address).json(&request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() && body.is_empty() {
            return Err(SdkError::Transport(format!("{} returned HTTP {}", method, status)));
        }

        let envelope: RpcResponse<R> = serde_json::from_slice(&body)
            .map_err(|e| SdkError::Encoding(format!("{} response: {}", method, e)))?;

        if envelope.id != serde_json::json!(id) {
            return Err(SdkError::Transport(format!(
                "{} response id {} does not match request id {}",
                method, envelope.id, id
            )));
        }
        if let Some(error) = envelope.error {
            return Err(SdkError::Transport(format!("{}: {}", method, error)));
        }
        envelope
            .result
            .ok_or_else(|| SdkError::Transport(format!("{} returned neither result nor error", method)))
    }

    /// ABCI query at the latest height. Non-zero codes become chain errors.
    pub async fn abci_query(&self, path: &str, data: &[u8]) -> SdkResult<AbciQueryResponse> {
        let params = serde_json::json!({
            "path": path,
            "data": hex::encode(data),
            "height": "0",
            "prove": false,
        });
        let result: AbciQueryResult = self.call("abci_query", params).await?;
        let response = result.response;
        if response.code != 0 {
            return Err(self.chain_error(&response.codespace, response.code, &response.log));
        }
        Ok(response)
    }

    /// Protobuf gRPC method served through `abci_query`.
    pub async fn grpc_query<Req, Res>(&self, path: &str, request: &Req) -> SdkResult<Res>
    where
        Req: Message,
        Res: Message + Default,
    {
        let response = self.abci_query(path, &request.encode_to_vec()).await?;
        let value = base64::engine::general_purpose::STANDARD
            .decode(response.value.as_bytes())
            .map_err(|e| SdkError::Encoding(format!("{} value: {}", path, e)))?;
        Ok(Res::decode(value.as_slice())?)
    }

    pub async fn broadcast_tx_sync(&self, tx_bytes: &[u8]) -> SdkResult<ResultTx> {
        self.broadcast_checked(BroadcastMode::Sync, tx_bytes).await
    }

    pub async fn broadcast_tx_async(&self, tx_bytes: &[u8]) -> SdkResult<ResultTx> {
        self.broadcast_checked(BroadcastMode::Async, tx_bytes).await
    }

    pub async fn broadcast_tx_commit(&self, tx_bytes: &[u8]) -> SdkResult<ResultTx> {
        let result: BroadcastTxCommitResult = self
            .call(BroadcastMode::Commit.rpc_method(), tx_param(tx_bytes))
            .await?;

        if result.check_tx.code != 0 {
            let check = &result.check_tx;
            return Err(self.chain_error(&check.codespace, check.code, &check.log));
        }
        if result.deliver_tx.code != 0 {
            let deliver = &result.deliver_tx;
            return Err(self.chain_error(&deliver.codespace, deliver.code, &deliver.log));
        }

        Ok(ResultTx {
            hash: result.hash,
            height: result.height,
            gas_wanted: result.deliver_tx.gas_wanted,
            gas_used: result.deliver_tx.gas_used,
            data: result.deliver_tx.data,
            events: result.deliver_tx.events,
        })
    }

    async fn broadcast_checked(&self, mode: BroadcastMode, tx_bytes: &[u8]) -> SdkResult<ResultTx> {
        let result: BroadcastTxResult = self.call(mode.rpc_method(), tx_param(tx_bytes)).await?;
        if result.code != 0 {
            return Err(self.chain_error(&result.codespace, result.code, &result.log));
        }
        Ok(ResultTx {
            hash: result.hash,
            data: result.data,
            ..Default::default()
        })
    }

    /// Look up a committed transaction by hex hash.
    pub async fn tx(&self, hash: &str) -> SdkResult<TxResponse> {
        let raw = hex::decode(hash.trim_start_matches("0x"))
            .map_err(|e| SdkError::Encoding(format!("invalid tx hash '{}': {}", hash, e)))?;
        let params = serde_json::json!({
            "hash": base64::engine::general_purpose::STANDARD.encode(raw),
            "prove": false,
        });
        self.call("tx", params).await
    }

    pub async fn tx_search(&self, query: &str, page: u32, per_page: u32, order_by: &str) -> SdkResult<TxSearchResult> {
        let params = serde_json::json!({
            "query": query,
            "prove": false,
            "page": page.to_string(),
            "per_page": per_page.to_string(),
            "order_by": order_by,
        });
        self.call("tx_search", params).await
    }

    pub async fn status(&self) -> SdkResult<StatusResult> {
        self.call("status", serde_json::json!({})).await
    }

    fn chain_error(&self, codespace: &str, code: u32, log: &str) -> SdkError {
        let log = if log.is_empty() {
            self.registry
                .describe(codespace, code)
                .unwrap_or("unknown error")
                .to_string()
        } else {
            log.to_string()
        };
        SdkError::chain(codespace, code, log)
    }
}

fn tx_param(tx_bytes: &[u8]) -> serde_json::Value {
    serde_json::json!({ "tx": base64::engine::general_purpose::STANDARD.encode(tx_bytes) })
}

/// Extract the `BaseAccount` from any account type the auth module returns.
pub fn decode_account(any: &cosmrs::Any) -> SdkResult<BaseAccount> {
    use cosmrs::proto::cosmos::auth::v1beta1::BaseAccount as ProtoBaseAccount;

    let base = if any.type_url == BASE_ACCOUNT_TYPE_URL {
        Some(ProtoBaseAccount::decode(any.value.as_slice())?)
    } else if any.type_url.contains("Vesting") {
        VestingAccount::decode(any.value.as_slice())?
            .base_vesting_account
            .and_then(|v| v.base_account)
    } else {
        EmbeddedBaseAccount::decode(any.value.as_slice())?.base_account
    };

    let base = base.ok_or_else(|| {
        SdkError::Encoding(format!("account type {} carries no base account", any.type_url))
    })?;
    Ok(BaseAccount {
        address: base.address,
        account_number: base.account_number,
        sequence: base.sequence,
        pubkey: base.pub_key,
    })
}

#[async_trait]
impl ChainQuerier for RpcClient {
    async fn query_account(&self, address: &str) -> SdkResult<BaseAccount> {
        use cosmrs::proto::cosmos::auth::v1beta1::{QueryAccountRequest, QueryAccountResponse};

        let request = QueryAccountRequest {
            address: address.to_string(),
        };
        let response: QueryAccountResponse = self
            .grpc_query(ACCOUNT_QUERY_PATH, &request)
            .await
            .map_err(|e| e.wrap(format!("query account {}", address)))?;
        let any = response
            .account
            .ok_or_else(|| SdkError::chain("sdk", 22, format!("account {} not found", address)))?;
        decode_account(&any)
    }

    async fn simulate(&self, tx_bytes: Vec<u8>) -> SdkResult<GasInfo> {
        use cosmrs::proto::cosmos::tx::v1beta1::{SimulateRequest, SimulateResponse};

        let request = SimulateRequest {
            tx_bytes,
            ..Default::default()
        };
        let response: SimulateResponse = self.grpc_query(SIMULATE_PATH, &request).await?;
        let gas = response
            .gas_info
            .ok_or_else(|| SdkError::Simulation("response carries no gas info".into()))?;
        Ok(GasInfo {
            gas_wanted: gas.gas_wanted,
            gas_used: gas.gas_used,
        })
    }
}

#[async_trait]
impl TxBroadcaster for RpcClient {
    async fn broadcast_tx(&self, tx_bytes: Vec<u8>, mode: BroadcastMode) -> SdkResult<ResultTx> {
        match mode {
            BroadcastMode::Sync => self.broadcast_tx_sync(&tx_bytes).await,
            BroadcastMode::Async => self.broadcast_tx_async(&tx_bytes).await,
            BroadcastMode::Commit => self.broadcast_tx_commit(&tx_bytes).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmrs::proto::cosmos::auth::v1beta1::BaseAccount as ProtoBaseAccount;

    fn proto_account() -> ProtoBaseAccount {
        ProtoBaseAccount {
            address: "cosmos1xyz".into(),
            pub_key: None,
            account_number: 11,
            sequence: 4,
        }
    }

    #[test]
    fn test_decode_base_account() {
        let any = cosmrs::Any {
            type_url: BASE_ACCOUNT_TYPE_URL.into(),
            value: proto_account().encode_to_vec(),
        };
        let account = decode_account(&any).unwrap();
        assert_eq!(account.account_number, 11);
        assert_eq!(account.sequence, 4);
    }

    #[test]
    fn test_decode_wrapped_accounts() {
        let eth = cosmrs::Any {
            type_url: "/ethermint.types.v1.EthAccount".into(),
            value: EmbeddedBaseAccount {
                base_account: Some(proto_account()),
            }
            .encode_to_vec(),
        };
        assert_eq!(decode_account(&eth).unwrap().sequence, 4);

        let vesting = cosmrs::Any {
            type_url: "/cosmos.vesting.v1beta1.ContinuousVestingAccount".into(),
            value: VestingAccount {
                base_vesting_account: Some(EmbeddedBaseAccount {
                    base_account: Some(proto_account()),
                }),
            }
            .encode_to_vec(),
        };
        assert_eq!(decode_account(&vesting).unwrap().account_number, 11);
    }

    #[test]
    fn test_empty_log_uses_registry() {
        let registry = Arc::new(ErrorRegistry::with_defaults().unwrap());
        let client = RpcClient::new("http://127.0.0.1:26657", Duration::from_secs(1), registry).unwrap();
        let err = client.chain_error("sdk", 5, "");
        assert_eq!(err.to_string(), "[sdk:5] insufficient funds");
    }

    #[test]
    fn test_rejects_bad_address() {
        let registry = Arc::new(ErrorRegistry::new());
        assert!(RpcClient::new("not a url", Duration::from_secs(1), registry).is_err());
    }
}
