//! Transaction under construction.
//!
//! Holds messages, fee and signer data in client types and renders the
//! protobuf `TxBody` / `AuthInfo` / `TxRaw` on demand. The same value is
//! signed in place: `set_signer` before computing sign bytes, then
//! `set_signature`.

use base64::Engine;
use cosmrs::proto::cosmos::tx::v1beta1::{mode_info, AuthInfo, Fee, ModeInfo, SignerInfo, TxBody, TxRaw};
use prost::Message;

use crate::error::SdkResult;
use crate::keys::PublicKey;
use crate::tx::coins::Coin;
use crate::tx::sign_mode::SignMode;
use crate::tx::types::MsgRef;

/// Signer slot of a single-signer transaction.
#[derive(Debug, Clone)]
pub struct SignerSlot {
    pub pubkey: Option<PublicKey>,
    pub sequence: u64,
    pub mode: SignMode,
}

#[derive(Debug, Clone)]
pub struct UnsignedTx {
    pub msgs: Vec<MsgRef>,
    pub memo: String,
    pub timeout_height: u64,
    pub fee: Vec<Coin>,
    pub gas_limit: u64,
    pub fee_payer: String,
    pub fee_granter: String,
    signer: Option<SignerSlot>,
    signature: Vec<u8>,
}

impl UnsignedTx {
    pub fn new(msgs: Vec<MsgRef>) -> Self {
        Self {
            msgs,
            memo: String::new(),
            timeout_height: 0,
            fee: Vec::new(),
            gas_limit: 0,
            fee_payer: String::new(),
            fee_granter: String::new(),
            signer: None,
            signature: Vec::new(),
        }
    }

    /// Record the signer's public key, sequence and sign mode in `AuthInfo`.
    pub fn set_signer(&mut self, pubkey: Option<PublicKey>, sequence: u64, mode: SignMode) {
        self.signer = Some(SignerSlot { pubkey, sequence, mode });
    }

    pub fn signer(&self) -> Option<&SignerSlot> {
        self.signer.as_ref()
    }

    pub fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn body(&self) -> SdkResult<TxBody> {
        let messages = self.msgs.iter().map(|m| m.to_any()).collect::<SdkResult<Vec<_>>>()?;
        Ok(TxBody {
            messages,
            memo: self.memo.clone(),
            timeout_height: self.timeout_height,
            ..Default::default()
        })
    }

    pub fn auth_info(&self) -> AuthInfo {
        let signer_infos = self
            .signer
            .iter()
            .map(|slot| SignerInfo {
                public_key: slot.pubkey.as_ref().map(PublicKey::to_any),
                mode_info: Some(ModeInfo {
                    sum: Some(mode_info::Sum::Single(mode_info::Single {
                        mode: slot.mode.to_proto(),
                    })),
                }),
                sequence: slot.sequence,
            })
            .collect();

        AuthInfo {
            signer_infos,
            fee: Some(Fee {
                amount: self.fee.iter().map(Coin::to_proto).collect(),
                gas_limit: self.gas_limit,
                payer: self.fee_payer.clone(),
                granter: self.fee_granter.clone(),
            }),
            ..Default::default()
        }
    }

    pub fn body_bytes(&self) -> SdkResult<Vec<u8>> {
        Ok(self.body()?.encode_to_vec())
    }

    pub fn auth_info_bytes(&self) -> Vec<u8> {
        self.auth_info().encode_to_vec()
    }

    /// Wire form. An unsigned tx carries one empty signature, which is what
    /// the node expects for simulation.
    pub fn to_raw(&self) -> SdkResult<TxRaw> {
        let signatures = if self.signer.is_some() {
            vec![self.signature.clone()]
        } else {
            Vec::new()
        };
        Ok(TxRaw {
            body_bytes: self.body_bytes()?,
            auth_info_bytes: self.auth_info_bytes(),
            signatures,
        })
    }

    /// Protobuf-encoded `TxRaw`.
    pub fn encode(&self) -> SdkResult<Vec<u8>> {
        Ok(self.to_raw()?.encode_to_vec())
    }

    /// Human-readable view, as printed by the CLI.
    pub fn to_json(&self) -> SdkResult<serde_json::Value> {
        let b64 = base64::engine::general_purpose::STANDARD;
        let messages: Vec<_> = self
            .msgs
            .iter()
            .map(|m| {
                m.to_any().map(|any| {
                    serde_json::json!({ "@type": any.type_url, "value": b64.encode(&any.value) })
                })
            })
            .collect::<SdkResult<_>>()?;

        let signer_infos: Vec<_> = self
            .signer
            .iter()
            .map(|slot| {
                serde_json::json!({
                    "public_key": slot.pubkey.as_ref().map(|pk| serde_json::json!({
                        "@type": pk.algo().pubkey_type_url(),
                        "key": b64.encode(pk.as_bytes()),
                    })),
                    "mode_info": { "single": { "mode": slot.mode.as_str() } },
                    "sequence": slot.sequence.to_string(),
                })
            })
            .collect();

        let signatures: Vec<_> = self.signer.iter().map(|_| b64.encode(&self.signature)).collect();

        Ok(serde_json::json!({
            "body": {
                "messages": messages,
                "memo": self.memo,
                "timeout_height": self.timeout_height.to_string(),
            },
            "auth_info": {
                "signer_infos": signer_infos,
                "fee": {
                    "amount": self.fee.iter().map(|c| serde_json::json!({
                        "denom": c.denom,
                        "amount": c.amount.to_string(),
                    })).collect::<Vec<_>>(),
                    "gas_limit": self.gas_limit.to_string(),
                    "payer": self.fee_payer,
                    "granter": self.fee_granter,
                },
            },
            "signatures": signatures,
        }))
    }
}
