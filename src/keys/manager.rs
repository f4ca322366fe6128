//! Password-protected in-memory key manager.
//!
//! # Responsibilities
//! - Hold named keys, each guarded by a salted password hash
//! - Resolve a `(name, password)` pair to an address and public key
//! - Sign transaction bytes on behalf of the factory
//!
//! # Design Decisions
//! - The factory only sees the `KeyManager` trait; on-disk keyrings plug in there
//! - A wrong password and an unknown name produce the same error kind

use dashmap::DashMap;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{SdkError, SdkResult};
use crate::keys::algo::{KeyAlgo, PrivKey, PublicKey};

/// Public view of a stored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub name: String,
    pub algo: KeyAlgo,
    pub address: String,
    pub pubkey: PublicKey,
}

impl KeyInfo {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "type": self.algo.as_str(),
            "address": self.address,
            "pubkey": self.pubkey.to_amino_json(),
        })
    }
}

/// Signing capability consumed by the transaction factory.
pub trait KeyManager: Send + Sync {
    /// Sign `msg` with key `name`, returning the signature and the signer's public key.
    fn sign(&self, name: &str, password: &str, msg: &[u8]) -> SdkResult<(Vec<u8>, PublicKey)>;

    /// Look up key `name`, checking `password`.
    fn find(&self, name: &str, password: &str) -> SdkResult<KeyInfo>;
}

struct StoredKey {
    key: PrivKey,
    salt: [u8; 16],
    password_hash: [u8; 32],
    info: KeyInfo,
}

impl StoredKey {
    fn check(&self, password: &str) -> SdkResult<()> {
        if hash_password(&self.salt, password) == self.password_hash {
            Ok(())
        } else {
            Err(SdkError::Key(format!("invalid password for key '{}'", self.info.name)))
        }
    }
}

fn hash_password(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Key manager backed by a concurrent map.
pub struct MemoryKeyManager {
    keys: DashMap<String, StoredKey>,
    prefix: String,
}

impl MemoryKeyManager {
    /// Create an empty manager deriving addresses under `bech32_prefix`.
    pub fn new(bech32_prefix: impl Into<String>) -> Self {
        Self {
            keys: DashMap::new(),
            prefix: bech32_prefix.into(),
        }
    }

    /// Generate a new random key.
    pub fn add(&self, name: &str, password: &str, algo: KeyAlgo) -> SdkResult<KeyInfo> {
        self.insert(name, password, PrivKey::generate(algo))
    }

    /// Recover a key from a BIP-39 mnemonic.
    pub fn recover(
        &self,
        name: &str,
        password: &str,
        mnemonic: &str,
        algo: KeyAlgo,
        hd_path: Option<&str>,
    ) -> SdkResult<KeyInfo> {
        let key = PrivKey::from_mnemonic(algo, mnemonic, hd_path)?;
        self.insert(name, password, key)
    }

    /// Import a hex-encoded private key.
    pub fn import(&self, name: &str, password: &str, algo: KeyAlgo, hex_key: &str) -> SdkResult<KeyInfo> {
        let key = PrivKey::from_hex(algo, hex_key)?;
        self.insert(name, password, key)
    }

    /// Export the private key as hex.
    pub fn export(&self, name: &str, password: &str) -> SdkResult<String> {
        let stored = self.get(name)?;
        stored.check(password)?;
        tracing::warn!(name = %name, "Private key exported");
        Ok(stored.key.to_hex())
    }

    /// Delete key `name` after checking its password.
    pub fn delete(&self, name: &str, password: &str) -> SdkResult<()> {
        self.get(name)?.check(password)?;
        self.keys.remove(name);
        tracing::info!(name = %name, "Key deleted");
        Ok(())
    }

    /// Public information for `name`, without a password check.
    pub fn show(&self, name: &str) -> SdkResult<KeyInfo> {
        Ok(self.get(name)?.info.clone())
    }

    /// All stored keys, sorted by name.
    pub fn list(&self) -> Vec<KeyInfo> {
        let mut infos: Vec<_> = self.keys.iter().map(|entry| entry.info.clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    fn insert(&self, name: &str, password: &str, key: PrivKey) -> SdkResult<KeyInfo> {
        if name.is_empty() {
            return Err(SdkError::Key("key name must not be empty".into()));
        }

        let info = KeyInfo {
            name: name.to_string(),
            algo: key.algo(),
            address: key.address(&self.prefix)?,
            pubkey: key.public_key()?,
        };

        let mut salt = [0u8; 16];
        rand::thread_rng().fill(&mut salt);

        match self.keys.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(SdkError::Key(format!("key '{}' already exists", name)))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(StoredKey {
                    key,
                    salt,
                    password_hash: hash_password(&salt, password),
                    info: info.clone(),
                });
                tracing::info!(name = %name, address = %info.address, algo = %info.algo, "Key stored");
                Ok(info)
            }
        }
    }

    fn get(&self, name: &str) -> SdkResult<dashmap::mapref::one::Ref<'_, String, StoredKey>> {
        self.keys
            .get(name)
            .ok_or_else(|| SdkError::Key(format!("key '{}' not found", name)))
    }
}

impl KeyManager for MemoryKeyManager {
    fn sign(&self, name: &str, password: &str, msg: &[u8]) -> SdkResult<(Vec<u8>, PublicKey)> {
        let stored = self.get(name)?;
        stored.check(password)?;
        let signature = stored.key.sign(msg)?;
        Ok((signature, stored.info.pubkey.clone()))
    }

    fn find(&self, name: &str, password: &str) -> SdkResult<KeyInfo> {
        let stored = self.get(name)?;
        stored.check(password)?;
        Ok(stored.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    #[test]
    fn test_add_and_find() {
        let km = MemoryKeyManager::new("cosmos");
        let info = km.add("alice", "pw", KeyAlgo::Secp256k1).unwrap();
        assert!(info.address.starts_with("cosmos1"));

        let found = km.find("alice", "pw").unwrap();
        assert_eq!(found, info);
    }

    #[test]
    fn test_wrong_password_rejected() {
        let km = MemoryKeyManager::new("cosmos");
        km.add("alice", "pw", KeyAlgo::Secp256k1).unwrap();
        let err = km.find("alice", "nope").unwrap_err();
        assert!(err.to_string().contains("invalid password"));
        assert!(km.sign("alice", "nope", b"x").is_err());
        assert!(km.export("alice", "nope").is_err());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let km = MemoryKeyManager::new("cosmos");
        km.add("alice", "pw", KeyAlgo::Secp256k1).unwrap();
        assert!(km.add("alice", "pw", KeyAlgo::Secp256k1).is_err());
    }

    #[test]
    fn test_import_export_round_trip() {
        let km = MemoryKeyManager::new("cosmos");
        km.import("k", "pw", KeyAlgo::Secp256k1, TEST_PRIVATE_KEY).unwrap();
        assert_eq!(km.export("k", "pw").unwrap(), TEST_PRIVATE_KEY);
    }

    #[test]
    fn test_recover_matches_import() {
        let km = MemoryKeyManager::new("evmos");
        let recovered = km
            .recover("a", "pw", TEST_MNEMONIC, KeyAlgo::EthSecp256k1, None)
            .unwrap();
        let imported = km.import("b", "pw", KeyAlgo::EthSecp256k1, TEST_PRIVATE_KEY).unwrap();
        assert_eq!(recovered.address, imported.address);
    }

    #[test]
    fn test_recover_path_changes_key() {
        let km = MemoryKeyManager::new("cosmos");
        let a = km.recover("a", "pw", TEST_MNEMONIC, KeyAlgo::Secp256k1, None).unwrap();
        let b = km
            .recover("b", "pw", TEST_MNEMONIC, KeyAlgo::Secp256k1, Some("m/44'/118'/0'/0/1"))
            .unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn test_sign_returns_pubkey() {
        let km = MemoryKeyManager::new("cosmos");
        let info = km.add("alice", "pw", KeyAlgo::Secp256k1).unwrap();
        let (signature, pubkey) = km.sign("alice", "pw", b"payload").unwrap();
        assert_eq!(signature.len(), 64);
        assert_eq!(pubkey, info.pubkey);
    }

    #[test]
    fn test_delete_and_list() {
        let km = MemoryKeyManager::new("cosmos");
        km.add("b", "pw", KeyAlgo::Secp256k1).unwrap();
        km.add("a", "pw", KeyAlgo::EthSecp256k1).unwrap();
        let names: Vec<_> = km.list().into_iter().map(|k| k.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        km.delete("a", "pw").unwrap();
        assert!(km.show("a").is_err());
        assert_eq!(km.list().len(), 1);
    }
}
