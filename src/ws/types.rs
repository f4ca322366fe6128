//! Websocket event payloads.
//!
//! Every event the client understands is a variant of the closed `EventData`
//! enum; an unknown `type` tag is a decode error, not a silent pass-through.

use std::collections::HashMap;

use base64::Engine;
use cosmrs::proto::cosmos::tx::v1beta1::{TxBody, TxRaw};
use prost::Message;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{SdkError, SdkResult};
use crate::tx::AbciEvent;
use crate::rpc::types::{de_i64, de_null_default, TxResultData};

/// Query strings for the tendermint event kinds with typed decoding.
pub mod queries {
    pub const NEW_BLOCK: &str = "tm.event='NewBlock'";
    pub const NEW_BLOCK_HEADER: &str = "tm.event='NewBlockHeader'";
    pub const TX: &str = "tm.event='Tx'";
    pub const VALIDATOR_SET_UPDATES: &str = "tm.event='ValidatorSetUpdates'";
}

/// An event delivered on a subscription channel.
#[derive(Debug, Clone)]
pub struct Event {
    /// The query this event was delivered for.
    pub query: String,
    pub data: EventData,
    /// Composite event attributes, e.g. `"tx.hash" -> ["ABC..."]`.
    pub events: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventData {
    #[serde(rename = "tendermint/event/NewBlock")]
    NewBlock(EventDataNewBlock),
    #[serde(rename = "tendermint/event/NewBlockHeader")]
    NewBlockHeader(EventDataNewBlockHeader),
    #[serde(rename = "tendermint/event/Tx")]
    Tx(EventDataTx),
    #[serde(rename = "tendermint/event/ValidatorSetUpdates")]
    ValidatorSetUpdates(EventDataValidatorSetUpdates),
}

impl EventData {
    /// Decode the `data` field of an event message.
    pub fn decode(value: serde_json::Value) -> SdkResult<Self> {
        serde_json::from_value(value).map_err(|e| SdkError::Encoding(format!("event data: {}", e)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EventData::NewBlock(_) => "NewBlock",
            EventData::NewBlockHeader(_) => "NewBlockHeader",
            EventData::Tx(_) => "Tx",
            EventData::ValidatorSetUpdates(_) => "ValidatorSetUpdates",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockId {
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub chain_id: String,
    #[serde(deserialize_with = "de_i64")]
    pub height: i64,
    pub time: String,
    #[serde(default)]
    pub last_block_id: BlockId,
    #[serde(default)]
    pub data_hash: String,
    #[serde(default)]
    pub validators_hash: String,
    #[serde(default)]
    pub next_validators_hash: String,
    #[serde(default)]
    pub app_hash: String,
    #[serde(default)]
    pub proposer_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    /// Base64-encoded `TxRaw` bytes.
    #[serde(default, deserialize_with = "de_null_default")]
    pub txs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    #[serde(default)]
    pub data: BlockData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDataNewBlock {
    pub block: Block,
}

impl EventDataNewBlock {
    pub fn height(&self) -> i64 {
        self.block.header.height
    }

    /// Hashes of the block's transactions.
    pub fn tx_hashes(&self) -> SdkResult<Vec<String>> {
        self.block.data.txs.iter().map(|tx| Ok(tx_hash(&decode_b64(tx)?))).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDataNewBlockHeader {
    pub header: Header,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    #[serde(deserialize_with = "de_i64")]
    pub height: i64,
    #[serde(default)]
    pub index: u32,
    /// Base64-encoded `TxRaw`.
    pub tx: String,
    #[serde(default)]
    pub result: TxResultData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDataTx {
    #[serde(rename = "TxResult")]
    pub tx_result: TxResult,
}

/// A transaction event with its body decoded.
#[derive(Debug, Clone)]
pub struct DecodedTx {
    /// Uppercase hex sha256 of the raw bytes.
    pub hash: String,
    pub height: i64,
    pub index: u32,
    pub body: TxBody,
    pub result: TxResultData,
    /// `result.events` merged by type, in order of first appearance.
    pub events: Vec<AbciEvent>,
}

impl EventDataTx {
    pub fn decode_tx(&self) -> SdkResult<DecodedTx> {
        let bytes = decode_b64(&self.tx_result.tx)?;
        let raw = TxRaw::decode(bytes.as_slice())?;
        let body = TxBody::decode(raw.body_bytes.as_slice())?;
        Ok(DecodedTx {
            hash: tx_hash(&bytes),
            height: self.tx_result.height,
            index: self.tx_result.index,
            body,
            result: self.tx_result.result.clone(),
            events: flatten_events(&self.tx_result.result.events),
        })
    }
}

/// Merge events of the same type into one, keeping every attribute in order.
pub fn flatten_events(events: &[AbciEvent]) -> Vec<AbciEvent> {
    let mut merged: Vec<AbciEvent> = Vec::new();
    for event in events {
        match merged.iter_mut().find(|e| e.kind == event.kind) {
            Some(existing) => existing.attributes.extend(event.attributes.iter().cloned()),
            None => merged.push(event.clone()),
        }
    }
    merged
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyJson {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub pub_key: PubKeyJson,
    #[serde(deserialize_with = "de_i64")]
    pub voting_power: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub proposer_priority: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDataValidatorSetUpdates {
    #[serde(default, deserialize_with = "de_null_default")]
    pub validator_updates: Vec<ValidatorUpdate>,
}

/// Tendermint tx hash: uppercase hex sha256.
pub fn tx_hash(tx_bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx_bytes))
}

fn decode_b64(s: &str) -> SdkResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(s.as_bytes())
        .map_err(|e| SdkError::Encoding(format!("base64: {}", e)))
}
