//! Client facade.
//!
//! # Responsibilities
//! - Own the configuration, error registry, key manager and RPC client
//! - Wire them into one `Broadcaster` shared by every send
//! - Open the websocket lazily on the first subscription
//!
//! # Data Flow
//! ```text
//! ClientConfig
//!     → Client::new
//!         ├─ ErrorRegistry (built once)
//!         ├─ MemoryKeyManager (bech32 prefix)
//!         ├─ RpcClient (ChainQuerier + TxBroadcaster)
//!         └─ Broadcaster (AccountCache + ShardedLocker)
//!     → build_and_send / send_batch / queries / subscriptions
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::config::{websocket_url, ClientConfig};
use crate::error::{ErrorRegistry, SdkError, SdkResult};
use crate::keys::MemoryKeyManager;
use crate::query::{BaseAccount, ChainQuerier, TxQuery};
use crate::rpc::types::{AbciQueryResponse, StatusResult, TxResponse, TxSearchResult};
use crate::rpc::RpcClient;
use crate::tx::{BaseTx, BroadcastSettings, Broadcaster, MsgRef, ResultTx};
use crate::ws::{Subscription, SubscriptionHandle, WsClient};

pub struct Client {
    config: ClientConfig,
    registry: Arc<ErrorRegistry>,
    keys: Arc<MemoryKeyManager>,
    rpc: Arc<RpcClient>,
    broadcaster: Broadcaster,
    ws: OnceCell<WsClient>,
}

impl Client {
    pub fn new(config: ClientConfig) -> SdkResult<Self> {
        let registry = Arc::new(ErrorRegistry::with_defaults()?);
        let keys = Arc::new(MemoryKeyManager::new(config.tx.bech32_prefix.clone()));
        let rpc = Arc::new(RpcClient::new(
            &config.node.rpc_address,
            Duration::from_secs(config.node.rpc_timeout_secs),
            registry.clone(),
        )?);

        let settings = BroadcastSettings {
            chain_id: config.node.chain_id.clone(),
            max_tx_bytes: config.node.max_tx_bytes,
            defaults: config.tx.clone(),
            accounts: config.accounts.clone(),
        };
        let broadcaster = Broadcaster::new(settings, keys.clone(), rpc.clone(), rpc.clone());

        tracing::info!(
            rpc_address = %config.node.rpc_address,
            chain_id = %config.node.chain_id,
            "Client initialized"
        );

        Ok(Self {
            config,
            registry,
            keys,
            rpc,
            broadcaster,
            ws: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &ErrorRegistry {
        &self.registry
    }

    pub fn keys(&self) -> &MemoryKeyManager {
        &self.keys
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub async fn build_and_send(&self, msgs: &[MsgRef], base_tx: &BaseTx) -> SdkResult<ResultTx> {
        self.broadcaster.build_and_send(msgs, base_tx).await
    }

    pub async fn send_batch(&self, msgs: &[MsgRef], base_tx: &BaseTx) -> SdkResult<Vec<ResultTx>> {
        self.broadcaster.send_batch(msgs, base_tx).await
    }

    pub async fn estimate_gas(&self, msgs: &[MsgRef], base_tx: &BaseTx) -> SdkResult<u64> {
        self.broadcaster.estimate_gas(msgs, base_tx).await
    }

    pub async fn query_account(&self, address: &str) -> SdkResult<BaseAccount> {
        self.rpc.query_account(address).await
    }

    pub async fn query_tx(&self, hash: &str) -> SdkResult<TxResponse> {
        self.rpc.tx(hash).await
    }

    pub async fn search_txs(&self, query: &TxQuery, page: u32, per_page: u32) -> SdkResult<TxSearchResult> {
        self.rpc.tx_search(&query.to_string(), page, per_page, "asc").await
    }

    pub async fn status(&self) -> SdkResult<StatusResult> {
        self.rpc.status().await
    }

    pub async fn abci_query(&self, path: &str, data: &[u8]) -> SdkResult<AbciQueryResponse> {
        self.rpc.abci_query(path, data).await
    }

    /// Query a gRPC method (`/<pkg>.Query/<Method>`) through `abci_query`.
    pub async fn grpc_query<Req, Res>(&self, path: &str, request: &Req) -> SdkResult<Res>
    where
        Req: prost::Message,
        Res: prost::Message + Default,
    {
        self.rpc.grpc_query(path, request).await
    }

    /// The websocket client, connecting on first use.
    pub async fn ws(&self) -> SdkResult<&WsClient> {
        self.ws
            .get_or_try_init(|| async {
                let url = websocket_url(&self.config.node)?;
                WsClient::connect(url, self.config.websocket.clone()).await
            })
            .await
    }

    pub async fn subscribe(&self, query: &str) -> SdkResult<Subscription> {
        self.ws().await?.subscribe(query).await
    }

    pub async fn unsubscribe(&self, query: &str) -> SdkResult<()> {
        match self.ws.get() {
            Some(ws) => ws.unsubscribe(query).await,
            None => Err(SdkError::Subscription(format!("not subscribed to \"{}\"", query))),
        }
    }

    pub async fn unsubscribe_all(&self) -> SdkResult<()> {
        match self.ws.get() {
            Some(ws) => ws.unsubscribe_all().await,
            None => Ok(()),
        }
    }

    pub async fn subscribe_tx<F, Fut>(&self, filter: TxQuery, handler: F) -> SdkResult<SubscriptionHandle>
    where
        F: Fn(crate::ws::DecodedTx) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = SdkResult<()>> + Send + 'static,
    {
        self.ws().await?.subscribe_tx(filter, handler).await
    }

    pub async fn subscribe_new_block<F, Fut>(&self, handler: F) -> SdkResult<SubscriptionHandle>
    where
        F: Fn(crate::ws::types::EventDataNewBlock) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = SdkResult<()>> + Send + 'static,
    {
        self.ws().await?.subscribe_new_block(handler).await
    }

    /// Close the websocket, if open. Subscription channels end.
    pub fn close(&self) {
        if let Some(ws) = self.ws.get() {
            ws.close();
        }
    }
}
