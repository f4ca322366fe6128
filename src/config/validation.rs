//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes, shard counts, attempt ceilings > 0)
//! - Detect conflicting fee models (flat fee vs. gas prices)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted by the client

use std::fmt;

use crate::config::schema::ClientConfig;
use crate::tx::coins::{parse_coins, parse_dec_coins};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.node.chain_id.trim().is_empty() {
        errors.push(ValidationError::new("node.chain_id", "must not be empty"));
    }

    if let Err(e) = url::Url::parse(&config.node.rpc_address) {
        errors.push(ValidationError::new("node.rpc_address", e.to_string()));
    }

    if let Some(ws) = &config.node.ws_address {
        match url::Url::parse(ws) {
            Ok(u) if u.scheme() != "ws" && u.scheme() != "wss" => {
                errors.push(ValidationError::new("node.ws_address", "scheme must be ws or wss"));
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new("node.ws_address", e.to_string())),
        }
    }

    if config.node.max_tx_bytes == 0 {
        errors.push(ValidationError::new("node.max_tx_bytes", "must be greater than 0"));
    }

    let has_fee = !config.tx.fee.trim().is_empty();
    let has_prices = !config.tx.gas_prices.trim().is_empty();
    if has_fee && has_prices {
        errors.push(ValidationError::new(
            "tx.fee",
            "cannot set both fee and gas_prices",
        ));
    }
    if has_fee {
        if let Err(e) = parse_coins(&config.tx.fee) {
            errors.push(ValidationError::new("tx.fee", e.to_string()));
        }
    }
    if has_prices {
        if let Err(e) = parse_dec_coins(&config.tx.gas_prices) {
            errors.push(ValidationError::new("tx.gas_prices", e.to_string()));
        }
    }

    if config.tx.gas_adjustment < 0.0 || !config.tx.gas_adjustment.is_finite() {
        errors.push(ValidationError::new("tx.gas_adjustment", "must be a non-negative number"));
    }

    if config.tx.bech32_prefix.is_empty() {
        errors.push(ValidationError::new("tx.bech32_prefix", "must not be empty"));
    }

    if config.accounts.lock_shards == 0 {
        errors.push(ValidationError::new("accounts.lock_shards", "must be greater than 0"));
    }
    if config.accounts.max_batch == 0 {
        errors.push(ValidationError::new("accounts.max_batch", "must be greater than 0"));
    }
    if config.accounts.try_threshold == 0 {
        errors.push(ValidationError::new("accounts.try_threshold", "must be greater than 0"));
    }

    if config.websocket.channel_capacity == 0 {
        errors.push(ValidationError::new("websocket.channel_capacity", "must be greater than 0"));
    }
    if config.websocket.max_concurrent_handlers == 0 {
        errors.push(ValidationError::new(
            "websocket.max_concurrent_handlers",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.node.chain_id = "test-1".into();
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ClientConfig::default();
        config.node.max_tx_bytes = 0;
        config.accounts.lock_shards = 0;
        config.websocket.max_concurrent_handlers = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"node.chain_id"));
        assert!(fields.contains(&"node.max_tx_bytes"));
        assert!(fields.contains(&"accounts.lock_shards"));
        assert!(fields.contains(&"websocket.max_concurrent_handlers"));
    }

    #[test]
    fn test_conflicting_fee_models() {
        let mut config = valid_config();
        config.tx.fee = "100uatom".into();
        config.tx.gas_prices = "0.01uatom".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "tx.fee");
    }

    #[test]
    fn test_ws_scheme_checked() {
        let mut config = valid_config();
        config.node.ws_address = Some("http://localhost:26657/websocket".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "node.ws_address");
    }
}
