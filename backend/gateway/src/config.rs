//! Application configuration loaded from environment variables.

use std::time::Duration;

use ethers::types::Address;

use crate::errors::{GatewayError, Result};

/// Sepolia endpoint template for the read-only fallback.
const ALCHEMY_SEPOLIA_URL: &str = "https://eth-sepolia.g.alchemy.com/v2";

#[derive(Debug, Clone)]
pub struct Config {
    /// The crowdfunding contract address
    pub contract_address: Address,
    /// Read-only remote endpoint (Alchemy Sepolia unless overridden)
    pub read_rpc_url: String,
    /// JSON-RPC channel of the interactive wallet; `None` means no wallet
    pub wallet_rpc_url: Option<String>,
    /// Blocks to wait for before a write counts as confirmed
    pub confirmations: usize,
    /// How often (in seconds) the event feed polls for new blocks
    pub poll_interval_secs: u64,
    /// Request timeout for read-only RPC calls; the wallet channel only bounds connecting
    pub rpc_timeout_secs: u64,
    /// Widest block range a single `eth_getLogs` request may span
    pub max_log_range: u64,
    /// Port for the REST API server
    pub api_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let contract_address = var("CONTRACT_ADDRESS")
            .ok_or_else(|| {
                GatewayError::Config("CONTRACT_ADDRESS environment variable is required".to_string())
            })?
            .trim()
            .parse::<Address>()
            .map_err(|_| GatewayError::Config("Invalid CONTRACT_ADDRESS".to_string()))?;

        let read_rpc_url = match (var("READ_RPC_URL"), var("ALCHEMY_API_KEY")) {
            (Some(url), _) => url,
            (None, Some(key)) => format!("{ALCHEMY_SEPOLIA_URL}/{}", key.trim()),
            (None, None) => {
                return Err(GatewayError::Config(
                    "Either READ_RPC_URL or ALCHEMY_API_KEY must be set".to_string(),
                ))
            }
        };

        Ok(Config {
            contract_address,
            read_rpc_url,
            wallet_rpc_url: var("WALLET_RPC_URL"),
            confirmations: parse_or(&var, "CONFIRMATIONS", 1)?,
            poll_interval_secs: parse_or(&var, "POLL_INTERVAL_SECS", 5)?,
            rpc_timeout_secs: parse_or(&var, "RPC_TIMEOUT_SECS", 30)?,
            max_log_range: parse_or(&var, "MAX_LOG_RANGE", 500)?,
            api_port: parse_or(&var, "API_PORT", 3001)?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            poll_interval: self.poll_interval(),
            max_log_range: self.max_log_range.max(1),
        }
    }
}

/// Polling cadence and log paging of the event feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    pub poll_interval: Duration,
    /// Blocks per `eth_getLogs` request, at least one
    pub max_log_range: u64,
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| GatewayError::Config(format!("Invalid {key}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_required_vars_set() {
        let config = config_from(&[("CONTRACT_ADDRESS", ADDRESS), ("ALCHEMY_API_KEY", "demo")]).unwrap();
        assert_eq!(config.contract_address, ADDRESS.parse::<Address>().unwrap());
        assert_eq!(config.read_rpc_url, "https://eth-sepolia.g.alchemy.com/v2/demo");
        assert_eq!(config.wallet_rpc_url, None);
        assert_eq!(config.confirmations, 1);
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.rpc_timeout_secs, 30);
        assert_eq!(config.max_log_range, 500);
        assert_eq!(config.api_port, 3001);
    }

    #[test]
    fn log_range_is_configurable_and_never_zero() {
        let config = config_from(&[
            ("CONTRACT_ADDRESS", ADDRESS),
            ("ALCHEMY_API_KEY", "demo"),
            ("MAX_LOG_RANGE", "10"),
            ("POLL_INTERVAL_SECS", "2"),
        ])
        .unwrap();
        assert_eq!(
            config.feed_options(),
            FeedOptions {
                poll_interval: Duration::from_secs(2),
                max_log_range: 10,
            }
        );

        let config = config_from(&[
            ("CONTRACT_ADDRESS", ADDRESS),
            ("ALCHEMY_API_KEY", "demo"),
            ("MAX_LOG_RANGE", "0"),
        ])
        .unwrap();
        assert_eq!(config.feed_options().max_log_range, 1);
    }

    #[test]
    fn read_rpc_url_overrides_alchemy() {
        let config = config_from(&[
            ("CONTRACT_ADDRESS", ADDRESS),
            ("ALCHEMY_API_KEY", "demo"),
            ("READ_RPC_URL", "http://localhost:8545"),
            ("WALLET_RPC_URL", "http://127.0.0.1:1248"),
        ])
        .unwrap();
        assert_eq!(config.read_rpc_url, "http://localhost:8545");
        assert_eq!(config.wallet_rpc_url.as_deref(), Some("http://127.0.0.1:1248"));
    }

    #[test]
    fn missing_contract_address_is_an_error() {
        let err = config_from(&[("ALCHEMY_API_KEY", "demo")]).unwrap_err();
        assert!(matches!(err, GatewayError::Config(msg) if msg.contains("CONTRACT_ADDRESS")));
    }

    #[test]
    fn missing_read_endpoint_is_an_error() {
        let err = config_from(&[("CONTRACT_ADDRESS", ADDRESS)]).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = config_from(&[
            ("CONTRACT_ADDRESS", ADDRESS),
            ("ALCHEMY_API_KEY", "demo"),
            ("CONFIRMATIONS", "many"),
        ])
        .unwrap_err();
        assert!(matches!(err, GatewayError::Config(msg) if msg == "Invalid CONFIRMATIONS"));
    }

    #[test]
    fn empty_wallet_url_means_no_wallet() {
        let config = config_from(&[
            ("CONTRACT_ADDRESS", ADDRESS),
            ("ALCHEMY_API_KEY", "demo"),
            ("WALLET_RPC_URL", "  "),
        ])
        .unwrap();
        assert!(config.wallet_rpc_url.is_none());
    }
}
