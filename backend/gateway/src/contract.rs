//! Crowdfunding contract bindings and the live contract handle.
//!
//! [`CrowdFundContract`] is the seam between the gateway and the chain: the
//! production implementation ([`EthersCrowdFund`]) talks JSON-RPC through
//! ethers, tests plug in an in-memory double.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::contract::{abigen, ContractError};
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::{Address, Filter, TransactionReceipt, U256, U64};
use tracing::debug;

use crate::errors::{GatewayError, Result};
use crate::events::ContractEvent;

abigen!(
    CrowdFund,
    r#"[
        function createProject(string name, string description, uint256 goalAmount, uint256 durationInSeconds)
        function contribute(uint256 projectId) payable
        function claimFunds(uint256 projectId)
        function failProjectAfterDeadline(uint256 projectId)
        function claimRefund(uint256 projectId)
        function getProjectDetails(uint256 projectId) view returns (address, string, string, uint256, uint256, uint256, bool, bool)
        function getAllProjectIds() view returns (uint256[])
        function getContribution(uint256 projectId, address contributor) view returns (uint256)
    ]"#
);

/// EIP-1193 "user rejected request".
const USER_REJECTED_CODE: i64 = 4001;
/// Geth-style "execution reverted" error code.
const EXECUTION_REVERTED_CODE: i64 = 3;
/// Selector of Solidity's `Error(string)`.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// `getProjectDetails` as the contract returns it:
/// (creator, name, description, goalAmount, deadline, currentAmount,
/// fundingGoalReached, closed).
pub type ProjectDetailsTuple = (Address, String, String, U256, U256, U256, bool, bool);

/// A state-changing contract call with validated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    CreateProject {
        name: String,
        description: String,
        goal: U256,
        duration: U256,
    },
    Contribute {
        project_id: U256,
        value: U256,
    },
    ClaimFunds {
        project_id: U256,
    },
    FailProjectAfterDeadline {
        project_id: U256,
    },
    ClaimRefund {
        project_id: U256,
    },
}

impl WriteCall {
    /// Contract method name.
    pub fn method(&self) -> &'static str {
        match self {
            Self::CreateProject { .. } => "createProject",
            Self::Contribute { .. } => "contribute",
            Self::ClaimFunds { .. } => "claimFunds",
            Self::FailProjectAfterDeadline { .. } => "failProjectAfterDeadline",
            Self::ClaimRefund { .. } => "claimRefund",
        }
    }
}

impl fmt::Display for WriteCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateProject { name, goal, duration, .. } => write!(
                f,
                "createProject(name={name:?}, goal={goal} wei, duration={duration}s)"
            ),
            Self::Contribute { project_id, value } => {
                write!(f, "contribute(project={project_id}, value={value} wei)")
            }
            Self::ClaimFunds { project_id }
            | Self::FailProjectAfterDeadline { project_id }
            | Self::ClaimRefund { project_id } => {
                write!(f, "{}(project={project_id})", self.method())
            }
        }
    }
}

/// Everything the gateway and the event feed need from a live contract handle.
#[async_trait]
pub trait CrowdFundContract: Send + Sync {
    fn address(&self) -> Address;

    /// Submit a transaction and wait until it is confirmed.
    async fn submit(&self, call: WriteCall) -> Result<TransactionReceipt>;

    async fn get_project_details(&self, project_id: U256) -> Result<ProjectDetailsTuple>;

    async fn get_all_project_ids(&self) -> Result<Vec<U256>>;

    async fn get_contribution(&self, project_id: U256, contributor: Address) -> Result<U256>;

    async fn block_number(&self) -> Result<u64>;

    /// Crowdfunding notifications emitted in `[from_block, to_block]`.
    async fn events_between(&self, from_block: u64, to_block: u64) -> Result<Vec<ContractEvent>>;
}

/// Contract handle backed by an ethers HTTP provider.
///
/// For wallet connections the provider carries the granted account as its
/// default sender, so writes go out as `eth_sendTransaction` and the wallet
/// does the signing.
pub struct EthersCrowdFund {
    contract: CrowdFund<Provider<Http>>,
    provider: Arc<Provider<Http>>,
    confirmations: usize,
}

impl EthersCrowdFund {
    pub fn new(address: Address, provider: Arc<Provider<Http>>, confirmations: usize) -> Self {
        Self {
            contract: CrowdFund::new(address, provider.clone()),
            provider,
            confirmations,
        }
    }
}

#[async_trait]
impl CrowdFundContract for EthersCrowdFund {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn submit(&self, call: WriteCall) -> Result<TransactionReceipt> {
        let tx = match &call {
            WriteCall::CreateProject {
                name,
                description,
                goal,
                duration,
            } => self
                .contract
                .create_project(name.clone(), description.clone(), *goal, *duration),
            WriteCall::Contribute { project_id, value } => {
                self.contract.contribute(*project_id).value(*value)
            }
            WriteCall::ClaimFunds { project_id } => self.contract.claim_funds(*project_id),
            WriteCall::FailProjectAfterDeadline { project_id } => {
                self.contract.fail_project_after_deadline(*project_id)
            }
            WriteCall::ClaimRefund { project_id } => self.contract.claim_refund(*project_id),
        };

        let pending = tx.send().await.map_err(from_contract_error)?;
        let tx_hash = pending.tx_hash();
        debug!("{call} submitted as {tx_hash:?}, awaiting {} confirmation(s)", self.confirmations);

        let receipt = pending
            .confirmations(self.confirmations)
            .await
            .map_err(|e| from_provider_error(&e))?
            .ok_or_else(|| {
                GatewayError::Network(format!("transaction {tx_hash:?} was dropped from the mempool"))
            })?;

        if receipt.status == Some(U64::zero()) {
            return Err(GatewayError::TransactionReverted {
                reason: format!("{} reverted on-chain", call.method()),
                tx_hash: Some(receipt.transaction_hash),
            });
        }
        Ok(receipt)
    }

    async fn get_project_details(&self, project_id: U256) -> Result<ProjectDetailsTuple> {
        self.contract
            .get_project_details(project_id)
            .call()
            .await
            .map_err(from_contract_error)
    }

    async fn get_all_project_ids(&self) -> Result<Vec<U256>> {
        self.contract
            .get_all_project_ids()
            .call()
            .await
            .map_err(from_contract_error)
    }

    async fn get_contribution(&self, project_id: U256, contributor: Address) -> Result<U256> {
        self.contract
            .get_contribution(project_id, contributor)
            .call()
            .await
            .map_err(from_contract_error)
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| from_provider_error(&e))
    }

    async fn events_between(&self, from_block: u64, to_block: u64) -> Result<Vec<ContractEvent>> {
        let filter = Filter::new()
            .address(self.address())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| from_provider_error(&e))?;

        Ok(logs.iter().filter_map(ContractEvent::from_log).collect())
    }
}

// ─────────────────────────────────────────────────────────
// Error classification
// ─────────────────────────────────────────────────────────

/// Sort a JSON-RPC error into "user declined", "contract refused" or
/// plain network trouble.
pub fn classify_rpc_error(code: i64, message: &str) -> GatewayError {
    let lower = message.to_lowercase();
    if code == USER_REJECTED_CODE || lower.contains("user rejected") || lower.contains("user denied") {
        GatewayError::TransactionRejected(message.to_string())
    } else if code == EXECUTION_REVERTED_CODE || lower.contains("revert") {
        GatewayError::TransactionReverted {
            reason: message.to_string(),
            tx_hash: None,
        }
    } else {
        GatewayError::Network(format!("RPC error {code}: {message}"))
    }
}

pub(crate) fn from_provider_error(e: &ProviderError) -> GatewayError {
    match e.as_error_response() {
        Some(rpc) => classify_rpc_error(rpc.code, &rpc.message),
        None => GatewayError::Network(e.to_string()),
    }
}

fn from_contract_error(e: ContractError<Provider<Http>>) -> GatewayError {
    match &e {
        ContractError::Revert(data) => GatewayError::TransactionReverted {
            reason: revert_reason(data).unwrap_or_else(|| "execution reverted".to_string()),
            tx_hash: None,
        },
        ContractError::MiddlewareError { e } => from_provider_error(e),
        ContractError::ProviderError { e } => from_provider_error(e),
        other => GatewayError::Network(other.to_string()),
    }
}

/// Decode the message of a `require(..., "message")` revert.
pub fn revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    match abi::decode(&[ParamType::String], payload).ok()?.pop()? {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}
