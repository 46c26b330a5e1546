//! Application-wide error types.

use ethers::types::H256;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No wallet is configured, or the wallet refused account access.
    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    /// The wallet holder declined to sign the transaction.
    #[error("Transaction rejected by the wallet: {0}")]
    TransactionRejected(String),

    /// The contract refused the action (deadline passed, goal already met,
    /// caller not authorized, ...).
    #[error("Transaction reverted: {reason}")]
    TransactionReverted {
        reason: String,
        tx_hash: Option<H256>,
    },

    #[error("Network error: {0}")]
    Network(String),

    /// The contract handle could not be obtained for event subscription.
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GatewayError {
    /// Stable identifier for API consumers, so a UI can tell
    /// "user declined" apart from "contract rejected the action".
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WalletUnavailable(_) => "wallet_unavailable",
            Self::TransactionRejected(_) => "transaction_rejected",
            Self::TransactionReverted { .. } => "transaction_reverted",
            Self::Network(_) => "network_error",
            Self::Initialization(_) => "initialization_error",
            Self::Config(_) => "config_error",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(e: url::ParseError) -> Self {
        GatewayError::Config(format!("invalid RPC URL: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
