//! Transaction factory.
//!
//! # Responsibilities
//! - Assemble an `UnsignedTx` from messages and fee parameters
//! - Simulate to estimate gas
//! - Produce sign bytes, sign through the key manager, attach the signature
//!
//! # Data Flow
//! ```text
//! msgs + Factory
//!     → [simulate_and_execute] build with empty signature → ChainQuerier::simulate
//!     → gas = ceil(gas_adjustment × gas_used)
//!     → build_unsigned_tx → set_signer(pubkey, sequence, mode)
//!     → SignModeHandler::get_sign_bytes → KeyManager::sign → set_signature
//! ```
//!
//! # Design Decisions
//! - A factory is built fresh for every attempt; nothing here is cached
//! - Flat fee and gas prices are mutually exclusive

use std::sync::Arc;

use crate::error::{SdkError, SdkResult};
use crate::keys::KeyManager;
use crate::query::ChainQuerier;
use crate::tx::coins::{fee_from_gas_prices, Coin, DecCoin};
use crate::tx::sign_mode::{DefaultSignModeHandler, SignMode, SignModeHandler, SignerData};
use crate::tx::types::MsgRef;
use crate::tx::unsigned::UnsignedTx;

/// Gas estimate returned by `Factory::simulate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasEstimate {
    pub gas_used: u64,
    /// `ceil(gas_adjustment × gas_used)`.
    pub adjusted: u64,
}

/// Apply the gas adjustment, rounding up.
pub fn adjust_gas(gas_adjustment: f64, gas_used: u64) -> u64 {
    (gas_adjustment * gas_used as f64).ceil() as u64
}

#[derive(Clone)]
pub struct Factory {
    chain_id: String,
    address: String,
    account_number: u64,
    sequence: u64,
    fee: Vec<Coin>,
    gas_prices: Vec<DecCoin>,
    gas: u64,
    gas_adjustment: f64,
    memo: String,
    fee_granter: String,
    fee_payer: String,
    timeout_height: u64,
    sign_mode: Option<SignMode>,
    simulate_and_execute: bool,
    sign_mode_handler: Arc<dyn SignModeHandler>,
    keys: Arc<dyn KeyManager>,
    querier: Option<Arc<dyn ChainQuerier>>,
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("chain_id", &self.chain_id)
            .field("address", &self.address)
            .field("account_number", &self.account_number)
            .field("sequence", &self.sequence)
            .field("gas", &self.gas)
            .finish_non_exhaustive()
    }
}

impl Factory {
    pub fn new(keys: Arc<dyn KeyManager>) -> Self {
        Self {
            chain_id: String::new(),
            address: String::new(),
            account_number: 0,
            sequence: 0,
            fee: Vec::new(),
            gas_prices: Vec::new(),
            gas: 0,
            gas_adjustment: 1.0,
            memo: String::new(),
            fee_granter: String::new(),
            fee_payer: String::new(),
            timeout_height: 0,
            sign_mode: None,
            simulate_and_execute: false,
            sign_mode_handler: Arc::new(DefaultSignModeHandler),
            keys,
            querier: None,
        }
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_account_number(mut self, account_number: u64) -> Self {
        self.account_number = account_number;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_fee(mut self, fee: Vec<Coin>) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_gas_prices(mut self, gas_prices: Vec<DecCoin>) -> Self {
        self.gas_prices = gas_prices;
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_gas_adjustment(mut self, gas_adjustment: f64) -> Self {
        self.gas_adjustment = gas_adjustment;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_fee_granter(mut self, granter: impl Into<String>) -> Self {
        self.fee_granter = granter.into();
        self
    }

    pub fn with_fee_payer(mut self, payer: impl Into<String>) -> Self {
        self.fee_payer = payer.into();
        self
    }

    pub fn with_timeout_height(mut self, height: u64) -> Self {
        self.timeout_height = height;
        self
    }

    pub fn with_sign_mode(mut self, mode: Option<SignMode>) -> Self {
        self.sign_mode = mode;
        self
    }

    pub fn with_simulate_and_execute(mut self, simulate: bool) -> Self {
        self.simulate_and_execute = simulate;
        self
    }

    pub fn with_sign_mode_handler(mut self, handler: Arc<dyn SignModeHandler>) -> Self {
        self.sign_mode_handler = handler;
        self
    }

    pub fn with_querier(mut self, querier: Arc<dyn ChainQuerier>) -> Self {
        self.querier = Some(querier);
        self
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn account_number(&self) -> u64 {
        self.account_number
    }

    pub fn gas(&self) -> u64 {
        self.gas
    }

    /// Assemble the unsigned transaction with the factory's gas limit.
    pub fn build_unsigned_tx(&self, msgs: &[MsgRef]) -> SdkResult<UnsignedTx> {
        self.build_with_gas(msgs, self.gas)
    }

    fn build_with_gas(&self, msgs: &[MsgRef], gas: u64) -> SdkResult<UnsignedTx> {
        if self.chain_id.is_empty() {
            return Err(SdkError::MissingChainId);
        }
        if msgs.is_empty() {
            return Err(SdkError::EmptyMessages);
        }

        let fee = match (self.fee.is_empty(), self.gas_prices.is_empty()) {
            (false, false) => {
                return Err(SdkError::InvalidFee("cannot provide both fees and gas prices".into()))
            }
            (true, false) => fee_from_gas_prices(&self.gas_prices, gas)?,
            _ => self.fee.clone(),
        };

        let mut tx = UnsignedTx::new(msgs.to_vec());
        tx.memo = self.memo.clone();
        tx.timeout_height = self.timeout_height;
        tx.fee = fee;
        tx.gas_limit = gas;
        tx.fee_payer = self.fee_payer.clone();
        tx.fee_granter = self.fee_granter.clone();
        Ok(tx)
    }

    /// Simulate `msgs` signed by `name` and return the gas estimate.
    ///
    /// The simulated tx carries the signer's public key, the factory sequence
    /// and an empty signature.
    pub async fn simulate(&self, name: &str, password: &str, msgs: &[MsgRef]) -> SdkResult<GasEstimate> {
        let querier = self
            .querier
            .as_ref()
            .ok_or_else(|| SdkError::Simulation("no querier configured".into()))?;

        let key = self.keys.find(name, password)?;
        let mut tx = self.build_with_gas(msgs, self.gas)?;
        tx.set_signer(Some(key.pubkey), self.sequence, self.resolve_sign_mode());

        let gas_info = querier
            .simulate(tx.encode()?)
            .await
            .map_err(|e| e.wrap("simulation"))?;
        if gas_info.gas_used == 0 {
            return Err(SdkError::Simulation("node reported zero gas used".into()));
        }

        let estimate = GasEstimate {
            gas_used: gas_info.gas_used,
            adjusted: adjust_gas(self.gas_adjustment, gas_info.gas_used),
        };
        tracing::debug!(gas_used = estimate.gas_used, adjusted = estimate.adjusted, "Simulation complete");
        Ok(estimate)
    }

    /// Build, sign and return a transaction ready to encode.
    pub async fn build_and_sign(&self, name: &str, password: &str, msgs: &[MsgRef]) -> SdkResult<UnsignedTx> {
        let gas = if self.simulate_and_execute {
            self.simulate(name, password, msgs).await?.adjusted
        } else {
            self.gas
        };

        let mut tx = self.build_with_gas(msgs, gas)?;
        let mode = self.resolve_sign_mode();

        let key = self.keys.find(name, password)?;
        tx.set_signer(Some(key.pubkey), self.sequence, mode);

        let signer_data = SignerData {
            chain_id: self.chain_id.clone(),
            account_number: self.account_number,
            sequence: self.sequence,
        };
        let sign_bytes = self.sign_mode_handler.get_sign_bytes(mode, &signer_data, &tx)?;

        let (signature, pubkey) = self.keys.sign(name, password, &sign_bytes)?;
        tx.set_signer(Some(pubkey), self.sequence, mode);
        tx.set_signature(signature);

        tracing::debug!(
            address = %key.address,
            sequence = self.sequence,
            gas = gas,
            msgs = msgs.len(),
            "Transaction signed"
        );
        Ok(tx)
    }

    fn resolve_sign_mode(&self) -> SignMode {
        self.sign_mode.unwrap_or_else(|| self.sign_mode_handler.default_mode())
    }
}
