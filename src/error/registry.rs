//! Registry of known `(codespace, code)` pairs.
//!
//! Built once when the client is constructed and shared by reference. Registering
//! the same pair twice is a programming error reported as a `RegistryError`.

use std::collections::HashMap;
use thiserror::Error;

use crate::error::{codes, CLIENT_CODESPACE, ROOT_CODESPACE};

/// Failure while building the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("error code {code} already registered in codespace '{codespace}'")]
    Duplicate { codespace: String, code: u32 },

    #[error("code 0 is reserved for success (codespace '{0}')")]
    ReservedCode(String),
}

/// Maps `(codespace, code)` to a human-readable description.
#[derive(Debug, Default, Clone)]
pub struct ErrorRegistry {
    entries: HashMap<(String, u32), String>,
}

impl ErrorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the root SDK codes and the client's own codes.
    pub fn with_defaults() -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for (code, desc) in [
            (2, "tx parse error"),
            (3, "invalid sequence"),
            (4, "unauthorized"),
            (5, "insufficient funds"),
            (6, "unknown request"),
            (7, "invalid address"),
            (8, "invalid pubkey"),
            (9, "unknown address"),
            (10, "invalid coins"),
            (11, "out of gas"),
            (12, "memo too large"),
            (13, "insufficient fee"),
            (14, "maximum number of signatures exceeded"),
            (15, "no signatures supplied"),
            (18, "invalid request"),
            (19, "tx already in mempool"),
            (20, "mempool is full"),
            (21, "tx too large"),
            (22, "key not found"),
            (30, "tx timeout height"),
            (32, "incorrect account sequence"),
        ] {
            registry.register(ROOT_CODESPACE, code, desc)?;
        }

        for (code, desc) in [
            (codes::INTERNAL, "internal error"),
            (codes::MISSING_CHAIN_ID, "chain ID is not set"),
            (codes::INVALID_ADDRESS, "invalid address"),
            (codes::EMPTY_MESSAGES, "no messages"),
            (codes::INVALID_MESSAGE, "invalid message"),
            (codes::INVALID_FEE, "invalid fee"),
            (codes::KEY, "key error"),
            (codes::ENCODING, "encoding error"),
            (codes::TRANSPORT, "transport error"),
            (codes::CONFIG, "invalid configuration"),
            (codes::WEBSOCKET, "websocket error"),
            (codes::SUBSCRIPTION, "subscription error"),
            (codes::SIMULATION, "simulation failed"),
        ] {
            registry.register(CLIENT_CODESPACE, code, desc)?;
        }

        Ok(registry)
    }

    /// Register a code. Fails on duplicates and on the reserved code 0.
    pub fn register(
        &mut self,
        codespace: &str,
        code: u32,
        description: &str,
    ) -> Result<(), RegistryError> {
        if code == 0 {
            return Err(RegistryError::ReservedCode(codespace.to_string()));
        }
        let key = (codespace.to_string(), code);
        if self.entries.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                codespace: codespace.to_string(),
                code,
            });
        }
        self.entries.insert(key, description.to_string());
        Ok(())
    }

    /// Look up the description of a code.
    pub fn describe(&self, codespace: &str, code: u32) -> Option<&str> {
        self.entries
            .get(&(codespace.to_string(), code))
            .map(String::as_str)
    }

    /// Number of registered codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
