//! Faucet client configuration

use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use spout_common::utils::logging::LoggingConfig;
use spout_common::Address;
use std::time::Duration;

/// Faucet client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// JSON-RPC endpoint of the chain hosting the faucet
    pub rpc_url: String,

    /// Address of the deployed faucet contract
    pub faucet_address: String,

    /// Refuse to connect when the provider reports a different chain
    pub expected_chain_id: Option<u64>,

    /// Hex-encoded secp256k1 key of the local signing identity
    pub private_key: Option<String>,

    /// Path of a key file, used when `private_key` is unset
    pub key_file: Option<String>,

    /// Interval of the background cooldown poll (seconds)
    pub poll_interval_secs: u64,

    /// Interval between receipt lookups while awaiting confirmation (milliseconds)
    pub receipt_poll_interval_ms: u64,

    /// How long a success marker stays displayable (seconds)
    pub confirmation_display_secs: u64,

    /// Gas limit used when estimation is unavailable
    pub gas_limit: u64,

    /// Fixed gas price in wei; queried from the node when unset
    pub gas_price: Option<String>,

    /// Session database path (grants and mutation journal)
    pub db_path: String,

    /// Presentation API address
    pub api_addr: String,

    /// Serve /metrics
    pub metrics_enabled: bool,

    /// Enable CORS on the presentation API
    pub cors_enabled: bool,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            faucet_address: "0x12CE5cA399e3FF934c17A48117aeeb80D22d601C".to_string(),
            expected_chain_id: Some(17000), // Holesky
            private_key: None,
            key_file: None,
            poll_interval_secs: 60,
            receipt_poll_interval_ms: 1000,
            confirmation_display_secs: 3,
            gas_limit: 200_000,
            gas_price: None,
            db_path: "./spout_data".to_string(),
            api_addr: "127.0.0.1:3000".to_string(),
            metrics_enabled: true,
            cors_enabled: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `SPOUT_*` environment variables onto this configuration.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SPOUT_RPC_URL") {
            self.rpc_url = url;
        }

        if let Ok(addr) = std::env::var("SPOUT_FAUCET_ADDRESS") {
            self.faucet_address = addr;
        }

        if let Ok(chain_id) = std::env::var("SPOUT_CHAIN_ID") {
            self.expected_chain_id = chain_id.parse().ok();
        }

        if let Ok(key) = std::env::var("SPOUT_PRIVATE_KEY") {
            self.private_key = Some(key);
        }

        if let Ok(interval) = std::env::var("SPOUT_POLL_INTERVAL") {
            self.poll_interval_secs = interval.parse().unwrap_or(self.poll_interval_secs);
        }

        if let Ok(db_path) = std::env::var("SPOUT_DB_PATH") {
            self.db_path = db_path;
        }

        if let Ok(api_addr) = std::env::var("SPOUT_API_ADDR") {
            self.api_addr = api_addr;
        }

        if let Ok(level) = std::env::var("SPOUT_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("SPOUT_LOG_FORMAT") {
            match format.parse() {
                Ok(format) => self.logging.format = format,
                Err(e) => tracing::warn!("Ignoring SPOUT_LOG_FORMAT: {}", e),
            }
        }
    }

    pub fn faucet_address(&self) -> ClientResult<Address> {
        self.faucet_address
            .parse()
            .map_err(|e| ClientError::Config(format!("faucet_address: {}", e)))
    }

    /// Fixed gas price, if configured.
    pub fn gas_price(&self) -> ClientResult<Option<u128>> {
        self.gas_price
            .as_deref()
            .map(|price| {
                price
                    .parse::<u128>()
                    .map_err(|_| ClientError::Config(format!("gas_price: {}", price)))
            })
            .transpose()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms.max(1))
    }

    pub fn confirmation_display(&self) -> Duration {
        Duration::from_secs(self.confirmation_display_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.confirmation_display(), Duration::from_secs(3));
        assert!(config.faucet_address().is_ok());
        assert_eq!(config.gas_price().unwrap(), None);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let config = ClientConfig {
            faucet_address: "not-an-address".to_string(),
            gas_price: Some("lots".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.faucet_address(), Err(ClientError::Config(_))));
        assert!(matches!(config.gas_price(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"rpc_url":"http://node:8545","poll_interval_secs":5}"#).unwrap();
        assert_eq!(config.rpc_url, "http://node:8545");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.gas_limit, 200_000);
    }
}
