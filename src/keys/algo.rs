//! Key algorithms, private keys and public keys.
//!
//! # Security
//! - Private key bytes never appear in `Debug` output or logs
//! - Secrets only leave this module through `export` on the key manager

use std::fmt;
use std::str::FromStr;

use alloy::primitives::keccak256;
use alloy::signers::local::coins_bip39::English;
use alloy::signers::local::{MnemonicBuilder, PrivateKeySigner};
use alloy::signers::SignerSync;
use base64::Engine;
use cosmrs::crypto::secp256k1::SigningKey;
use cosmrs::AccountId;
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Default Cosmos HD path.
pub const COSMOS_HD_PATH: &str = "m/44'/118'/0'/0/0";

/// Default Ethereum HD path.
pub const ETH_HD_PATH: &str = "m/44'/60'/0'/0/0";

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAlgo {
    /// Cosmos secp256k1: sha256 digest, address = ripemd160(sha256(pubkey)).
    #[default]
    Secp256k1,
    /// Ethermint secp256k1: keccak256 digest, address = Ethereum address bytes.
    EthSecp256k1,
}

impl KeyAlgo {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgo::Secp256k1 => "secp256k1",
            KeyAlgo::EthSecp256k1 => "eth_secp256k1",
        }
    }

    pub fn default_hd_path(&self) -> &'static str {
        match self {
            KeyAlgo::Secp256k1 => COSMOS_HD_PATH,
            KeyAlgo::EthSecp256k1 => ETH_HD_PATH,
        }
    }

    /// Protobuf type URL of the public key.
    pub fn pubkey_type_url(&self) -> &'static str {
        match self {
            KeyAlgo::Secp256k1 => "/cosmos.crypto.secp256k1.PubKey",
            KeyAlgo::EthSecp256k1 => "/ethermint.crypto.v1.ethsecp256k1.PubKey",
        }
    }

    /// Amino type name of the public key.
    pub fn amino_pubkey_type(&self) -> &'static str {
        match self {
            KeyAlgo::Secp256k1 => "tendermint/PubKeySecp256k1",
            KeyAlgo::EthSecp256k1 => "ethermint/PubKeyEthSecp256k1",
        }
    }
}

impl fmt::Display for KeyAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgo {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secp256k1" => Ok(KeyAlgo::Secp256k1),
            "eth_secp256k1" | "ethsecp256k1" => Ok(KeyAlgo::EthSecp256k1),
            other => Err(SdkError::Key(format!("unsupported key algorithm '{}'", other))),
        }
    }
}

/// A compressed secp256k1 public key tagged with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    algo: KeyAlgo,
    bytes: Vec<u8>,
}

impl PublicKey {
    pub fn new(algo: KeyAlgo, bytes: Vec<u8>) -> Self {
        Self { algo, bytes }
    }

    pub fn algo(&self) -> KeyAlgo {
        self.algo
    }

    /// 33-byte SEC1 compressed encoding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Protobuf `Any` for `SignerInfo.public_key`.
    pub fn to_any(&self) -> cosmrs::Any {
        // ethsecp256k1.PubKey has the same layout: field 1 = key bytes
        let msg = cosmrs::proto::cosmos::crypto::secp256k1::PubKey {
            key: self.bytes.clone(),
        };
        cosmrs::Any {
            type_url: self.algo.pubkey_type_url().to_string(),
            value: msg.encode_to_vec(),
        }
    }

    /// Amino JSON form, as shown by `keys show`.
    pub fn to_amino_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.algo.amino_pubkey_type(),
            "value": base64::engine::general_purpose::STANDARD.encode(&self.bytes),
        })
    }
}

/// A raw 32-byte secp256k1 secret.
#[derive(Clone)]
pub struct PrivKey {
    algo: KeyAlgo,
    secret: [u8; 32],
}

impl fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivKey").field("algo", &self.algo).finish_non_exhaustive()
    }
}

impl PrivKey {
    /// Fresh random key.
    pub fn generate(algo: KeyAlgo) -> Self {
        let signer = PrivateKeySigner::random();
        Self {
            algo,
            secret: signer.to_bytes().0,
        }
    }

    /// Key from raw secret bytes; rejects values outside the curve order.
    pub fn from_bytes(algo: KeyAlgo, bytes: &[u8]) -> SdkResult<Self> {
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SdkError::Key(format!("private key must be 32 bytes, got {}", bytes.len())))?;
        SigningKey::from_slice(&secret).map_err(|e| SdkError::Key(format!("invalid private key: {}", e)))?;
        Ok(Self { algo, secret })
    }

    /// Key from a hex string, with or without `0x`.
    pub fn from_hex(algo: KeyAlgo, hex_key: &str) -> SdkResult<Self> {
        let key_hex = hex_key.trim().strip_prefix("0x").unwrap_or(hex_key.trim());
        let bytes = hex::decode(key_hex).map_err(|e| SdkError::Key(format!("invalid private key format: {}", e)))?;
        Self::from_bytes(algo, &bytes)
    }

    /// Derive from a BIP-39 mnemonic along `hd_path` (algorithm default when `None`).
    pub fn from_mnemonic(algo: KeyAlgo, mnemonic: &str, hd_path: Option<&str>) -> SdkResult<Self> {
        let path = hd_path.unwrap_or(algo.default_hd_path());
        let signer = MnemonicBuilder::<English>::default()
            .phrase(mnemonic.trim())
            .derivation_path(path)
            .map_err(|e| SdkError::Key(format!("invalid HD path '{}': {}", path, e)))?
            .build()
            .map_err(|e| SdkError::Key(format!("mnemonic recovery failed: {}", e)))?;
        Ok(Self {
            algo,
            secret: signer.to_bytes().0,
        })
    }

    pub fn algo(&self) -> KeyAlgo {
        self.algo
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.secret)
    }

    pub fn public_key(&self) -> SdkResult<PublicKey> {
        let bytes = self.cosmos_signer()?.public_key().to_bytes();
        Ok(PublicKey::new(self.algo, bytes))
    }

    /// Bech32 account address under `prefix`.
    pub fn address(&self, prefix: &str) -> SdkResult<String> {
        let account = match self.algo {
            KeyAlgo::Secp256k1 => self
                .cosmos_signer()?
                .public_key()
                .account_id(prefix)
                .map_err(|e| SdkError::Key(format!("address derivation failed: {}", e)))?,
            KeyAlgo::EthSecp256k1 => {
                let address = self.eth_signer()?.address();
                AccountId::new(prefix, address.as_slice())
                    .map_err(|e| SdkError::Key(format!("address derivation failed: {}", e)))?
            }
        };
        Ok(account.to_string())
    }

    /// Sign `msg`. Cosmos keys return 64-byte `r‖s`; eth keys return 65-byte `r‖s‖v`.
    pub fn sign(&self, msg: &[u8]) -> SdkResult<Vec<u8>> {
        match self.algo {
            KeyAlgo::Secp256k1 => {
                let signature = self
                    .cosmos_signer()?
                    .sign(msg)
                    .map_err(|e| SdkError::Key(format!("signing failed: {}", e)))?;
                Ok(signature.to_bytes().to_vec())
            }
            KeyAlgo::EthSecp256k1 => {
                let signature = self
                    .eth_signer()?
                    .sign_hash_sync(&keccak256(msg))
                    .map_err(|e| SdkError::Key(format!("signing failed: {}", e)))?;
                let mut out = Vec::with_capacity(65);
                out.extend_from_slice(&signature.r().to_be_bytes::<32>());
                out.extend_from_slice(&signature.s().to_be_bytes::<32>());
                out.push(signature.v() as u8);
                Ok(out)
            }
        }
    }

    fn cosmos_signer(&self) -> SdkResult<SigningKey> {
        SigningKey::from_slice(&self.secret).map_err(|e| SdkError::Key(format!("invalid private key: {}", e)))
    }

    fn eth_signer(&self) -> SdkResult<PrivateKeySigner> {
        PrivateKeySigner::from_slice(&self.secret).map_err(|e| SdkError::Key(format!("invalid private key: {}", e)))
    }
}
