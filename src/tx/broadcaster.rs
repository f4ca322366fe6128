//! Sign-and-broadcast pipeline.
//!
//! # Responsibilities
//! - Serialize all sends from one address
//! - Retry on sequence mismatch with a fresh account query
//! - Split message batches, halving the batch on oversized transactions
//!
//! # Data Flow
//! ```text
//! build_and_send(msgs, base_tx)
//!     → KeyManager::find(from)            (address)
//!     → ShardedLocker::lock(address)
//!     → attempt ×3 {
//!         AccountCache::query_and_refresh → Factory::build_and_sign
//!         → size check → TxBroadcaster::broadcast_tx
//!       } retry only on wrong sequence, invalidating the cache entry first
//! ```
//!
//! # Design Decisions
//! - A failure before broadcast, or a size rejection, restores the sequence it
//!   was built with; any other node failure drops the cache entry, since the
//!   sequence may or may not have been consumed
//! - Oversized transactions are fatal in `build_and_send`; `send_batch`
//!   shrinks and resumes from the first unsent message

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::accounts::{AccountCache, AccountInfo, ShardedLocker};
use crate::config::schema::{AccountsConfig, TxDefaults};
use crate::error::{SdkError, SdkResult};
use crate::keys::{KeyInfo, KeyManager};
use crate::observability::metrics;
use crate::query::{ChainQuerier, TxBroadcaster};
use crate::resilience::attempt;
use crate::tx::coins::{parse_coins, parse_dec_coins};
use crate::tx::factory::Factory;
use crate::tx::sign_mode::{DefaultSignModeHandler, SignModeHandler};
use crate::tx::types::{BaseTx, BroadcastMode, MsgRef, ResultTx};

/// Static settings the broadcaster needs from the client configuration.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub chain_id: String,
    pub max_tx_bytes: usize,
    pub defaults: TxDefaults,
    pub accounts: AccountsConfig,
}

pub struct Broadcaster {
    settings: BroadcastSettings,
    keys: Arc<dyn KeyManager>,
    cache: Arc<AccountCache>,
    locker: Arc<ShardedLocker>,
    querier: Arc<dyn ChainQuerier>,
    node: Arc<dyn TxBroadcaster>,
    sign_mode_handler: Arc<dyn SignModeHandler>,
}

/// Progress of a `send_batch` call, kept across sequence retries.
#[derive(Debug)]
struct BatchState {
    offset: usize,
    batch_size: usize,
    results: Vec<ResultTx>,
}

impl Broadcaster {
    pub fn new(
        settings: BroadcastSettings,
        keys: Arc<dyn KeyManager>,
        querier: Arc<dyn ChainQuerier>,
        node: Arc<dyn TxBroadcaster>,
    ) -> Self {
        let cache = Arc::new(AccountCache::new(settings.accounts.cache_ttl()));
        let locker = Arc::new(ShardedLocker::new(settings.accounts.lock_shards));
        Self {
            settings,
            keys,
            cache,
            locker,
            querier,
            node,
            sign_mode_handler: Arc::new(DefaultSignModeHandler),
        }
    }

    pub fn with_sign_mode_handler(mut self, handler: Arc<dyn SignModeHandler>) -> Self {
        self.sign_mode_handler = handler;
        self
    }

    pub fn cache(&self) -> &AccountCache {
        &self.cache
    }

    /// Build, sign and broadcast one transaction carrying `msgs`.
    pub async fn build_and_send(&self, msgs: &[MsgRef], base_tx: &BaseTx) -> SdkResult<ResultTx> {
        if msgs.is_empty() {
            return Err(SdkError::EmptyMessages);
        }

        let key = self.keys.find(&base_tx.from, &base_tx.password)?;
        let _guard = self.locker.lock(&key.address).await;

        attempt(
            |n| self.sign_and_broadcast(msgs, base_tx, &key, n),
            SdkError::is_sequence_mismatch,
            |n, err| self.invalidate_for_retry(&key.address, n, err),
            self.settings.accounts.try_threshold,
        )
        .await
    }

    /// Send `msgs` in as many transactions as needed, in order, each message once.
    ///
    /// Every message is validated before anything is signed. A transaction that
    /// is too large halves the batch size and is rebuilt from the same offset.
    pub async fn send_batch(&self, msgs: &[MsgRef], base_tx: &BaseTx) -> SdkResult<Vec<ResultTx>> {
        if msgs.is_empty() {
            return Err(SdkError::EmptyMessages);
        }
        for (i, msg) in msgs.iter().enumerate() {
            msg.validate_basic().map_err(|e| e.wrap(format!("message {}", i)))?;
        }

        let key = self.keys.find(&base_tx.from, &base_tx.password)?;
        let _guard = self.locker.lock(&key.address).await;

        let state = Mutex::new(BatchState {
            offset: 0,
            batch_size: self.settings.accounts.max_batch.max(1),
            results: Vec::new(),
        });

        let outcome = attempt(
            |n| self.send_remaining(msgs, base_tx, &key, &state, n),
            SdkError::is_sequence_mismatch,
            |n, err| self.invalidate_for_retry(&key.address, n, err),
            self.settings.accounts.try_threshold,
        )
        .await;

        let state = state.into_inner();
        match outcome {
            Ok(()) => {
                tracing::info!(
                    address = %key.address,
                    msgs = msgs.len(),
                    txs = state.results.len(),
                    "Batch sent"
                );
                Ok(state.results)
            }
            Err(e) => {
                tracing::warn!(
                    address = %key.address,
                    sent = state.offset,
                    total = msgs.len(),
                    error = %e,
                    "Batch aborted"
                );
                Err(e)
            }
        }
    }

    /// Simulate `msgs` and return the adjusted gas, without touching the cache.
    pub async fn estimate_gas(&self, msgs: &[MsgRef], base_tx: &BaseTx) -> SdkResult<u64> {
        let key = self.keys.find(&base_tx.from, &base_tx.password)?;
        let account = self.querier.query_account(&key.address).await?;
        let factory = self.factory(base_tx, &key, account.account_number, account.sequence)?;
        let estimate = factory.simulate(&base_tx.from, &base_tx.password, msgs).await?;
        Ok(estimate.adjusted)
    }

    async fn send_remaining(
        &self,
        msgs: &[MsgRef],
        base_tx: &BaseTx,
        key: &KeyInfo,
        state: &Mutex<BatchState>,
        attempt_no: u32,
    ) -> SdkResult<()> {
        let mut state = state.lock().await;

        while state.offset < msgs.len() {
            let end = (state.offset + state.batch_size).min(msgs.len());
            let chunk = &msgs[state.offset..end];

            match self.sign_and_broadcast(chunk, base_tx, key, attempt_no).await {
                Ok(result) => {
                    tracing::debug!(offset = state.offset, size = chunk.len(), hash = %result.hash, "Chunk sent");
                    state.results.push(result);
                    state.offset = end;
                }
                Err(e) if e.is_tx_too_large() && chunk.len() > 1 => {
                    state.batch_size = chunk.len() / 2;
                    metrics::record_batch_shrink(state.batch_size);
                    tracing::warn!(
                        offset = state.offset,
                        batch_size = state.batch_size,
                        "Transaction too large, halving batch"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn sign_and_broadcast(
        &self,
        msgs: &[MsgRef],
        base_tx: &BaseTx,
        key: &KeyInfo,
        attempt_no: u32,
    ) -> SdkResult<ResultTx> {
        let account = self.cache.query_and_refresh(&key.address, self.querier.as_ref()).await?;

        let bytes = match self.build_tx_bytes(msgs, base_tx, key, account).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.cache.restore(&key.address, account);
                tracing::debug!(address = %key.address, attempt = attempt_no, error = %e, "Build failed before broadcast");
                return Err(e);
            }
        };

        let mode = self.mode(base_tx);
        let result = self.node.broadcast_tx(bytes, mode).await;
        metrics::record_broadcast(mode.as_str(), result.is_ok());

        match result {
            Ok(result) => {
                tracing::info!(
                    address = %key.address,
                    sequence = account.sequence,
                    hash = %result.hash,
                    mode = %mode,
                    "Transaction broadcast"
                );
                Ok(result)
            }
            // Rejected by the size check, so the sequence was not consumed.
            Err(e) if e.is_tx_too_large() => {
                self.cache.restore(&key.address, account);
                tracing::debug!(address = %key.address, attempt = attempt_no, error = %e, "Node rejected oversized tx");
                Err(e)
            }
            Err(e) => {
                self.cache.remove(&key.address);
                tracing::debug!(address = %key.address, attempt = attempt_no, error = %e, "Send attempt failed");
                Err(e)
            }
        }
    }

    /// Sign with `account` and encode, enforcing the local size limit.
    async fn build_tx_bytes(
        &self,
        msgs: &[MsgRef],
        base_tx: &BaseTx,
        key: &KeyInfo,
        account: AccountInfo,
    ) -> SdkResult<Vec<u8>> {
        let factory = self.factory(base_tx, key, account.account_number, account.sequence)?;
        let tx = factory.build_and_sign(&base_tx.from, &base_tx.password, msgs).await?;
        let bytes = tx.encode()?;
        if bytes.len() > self.settings.max_tx_bytes {
            return Err(SdkError::TxTooLarge {
                size: bytes.len(),
                max: self.settings.max_tx_bytes,
            });
        }
        Ok(bytes)
    }

    fn invalidate_for_retry(&self, address: &str, attempt_no: u32, err: &SdkError) {
        metrics::record_sequence_retry();
        tracing::warn!(address = %address, attempt = attempt_no, error = %err, "Sequence mismatch, retrying");
        self.cache.remove(address);
    }

    fn mode(&self, base_tx: &BaseTx) -> BroadcastMode {
        base_tx.mode.unwrap_or(self.settings.defaults.mode)
    }

    /// Per-attempt factory: `BaseTx` fields override the client defaults.
    fn factory(&self, base_tx: &BaseTx, key: &KeyInfo, account_number: u64, sequence: u64) -> SdkResult<Factory> {
        let defaults = &self.settings.defaults;

        let (fee, gas_prices) = match (base_tx.fee.is_empty(), base_tx.gas_prices.is_empty()) {
            (true, true) => (defaults.fee.as_str(), defaults.gas_prices.as_str()),
            _ => (base_tx.fee.as_str(), base_tx.gas_prices.as_str()),
        };
        let gas = if base_tx.gas > 0 { base_tx.gas } else { defaults.gas };
        let gas_adjustment = if base_tx.gas_adjustment > 0.0 {
            base_tx.gas_adjustment
        } else {
            defaults.gas_adjustment
        };
        let timeout_height = if base_tx.timeout_height > 0 {
            base_tx.timeout_height
        } else {
            defaults.timeout_height
        };

        Ok(Factory::new(self.keys.clone())
            .with_chain_id(self.settings.chain_id.clone())
            .with_address(key.address.clone())
            .with_account_number(account_number)
            .with_sequence(sequence)
            .with_fee(parse_coins(fee)?)
            .with_gas_prices(parse_dec_coins(gas_prices)?)
            .with_gas(gas)
            .with_gas_adjustment(gas_adjustment)
            .with_memo(base_tx.memo.clone())
            .with_fee_granter(base_tx.fee_granter.clone())
            .with_fee_payer(base_tx.fee_payer.clone())
            .with_timeout_height(timeout_height)
            .with_sign_mode(base_tx.sign_mode)
            .with_simulate_and_execute(base_tx.simulate_and_execute)
            .with_sign_mode_handler(self.sign_mode_handler.clone())
            .with_querier(self.querier.clone()))
    }
}
