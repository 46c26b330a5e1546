//! Contract gateway: one typed wrapper per contract method.
//!
//! Writes validate their inputs, obtain a signing connection, submit and
//! wait for confirmation. Reads accept any connection and remap the
//! contract's tuples to the records in [`crate::models`]. Nothing is
//! retried; failures are logged and handed back to the caller.

use std::sync::Arc;

use ethers::types::{Address, TransactionReceipt, U256};
use tracing::{error, info};

use crate::connection::{Access, ConnectionManager};
use crate::contract::WriteCall;
use crate::errors::Result;
use crate::models::{narrow, Contribution, Project};
use crate::units::parse_ether;

pub struct CrowdFundGateway {
    connections: Arc<ConnectionManager>,
}

impl CrowdFundGateway {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    // ============ WRITE OPERATIONS ============

    /// Register a new project with a goal in ETH and a funding window in seconds.
    pub async fn create_project(
        &self,
        name: &str,
        description: &str,
        goal_eth: &str,
        duration_secs: u64,
    ) -> Result<TransactionReceipt> {
        let goal = parse_ether(goal_eth)?;
        self.execute(WriteCall::CreateProject {
            name: name.to_string(),
            description: description.to_string(),
            goal,
            duration: U256::from(duration_secs),
        })
        .await
    }

    pub async fn contribute(&self, project_id: u64, amount_eth: &str) -> Result<TransactionReceipt> {
        let value = parse_ether(amount_eth)?;
        self.execute(WriteCall::Contribute {
            project_id: U256::from(project_id),
            value,
        })
        .await
    }

    pub async fn claim_funds(&self, project_id: u64) -> Result<TransactionReceipt> {
        self.execute(WriteCall::ClaimFunds {
            project_id: U256::from(project_id),
        })
        .await
    }

    /// Mark a project failed once its deadline passed without reaching the goal.
    pub async fn fail_project(&self, project_id: u64) -> Result<TransactionReceipt> {
        self.execute(WriteCall::FailProjectAfterDeadline {
            project_id: U256::from(project_id),
        })
        .await
    }

    pub async fn claim_refund(&self, project_id: u64) -> Result<TransactionReceipt> {
        self.execute(WriteCall::ClaimRefund {
            project_id: U256::from(project_id),
        })
        .await
    }

    async fn execute(&self, call: WriteCall) -> Result<TransactionReceipt> {
        let connection = self.connections.ensure_connection(Access::Write).await?;
        info!("Submitting {call}");

        let receipt = connection
            .contract()
            .submit(call.clone())
            .await
            .inspect_err(|e| error!("{} failed: {e}", call.method()))?;

        info!(
            "SUCCESS: {} confirmed in tx {:?}",
            call.method(),
            receipt.transaction_hash
        );
        Ok(receipt)
    }

    // ============ READ OPERATIONS ============

    pub async fn project_details(&self, project_id: u64) -> Result<Project> {
        let connection = self.connections.ensure_connection(Access::Read).await?;
        let details = connection
            .contract()
            .get_project_details(U256::from(project_id))
            .await
            .inspect_err(|e| error!("Failed to fetch details of project {project_id}: {e}"))?;
        Project::from_details(project_id, details)
    }

    pub async fn all_project_ids(&self) -> Result<Vec<u64>> {
        let connection = self.connections.ensure_connection(Access::Read).await?;
        let ids = connection
            .contract()
            .get_all_project_ids()
            .await
            .inspect_err(|e| error!("Failed to fetch project ids: {e}"))?;
        ids.into_iter().map(|id| narrow(id, "project id")).collect()
    }

    /// Every project, in the order the contract lists their ids.
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for id in self.all_project_ids().await? {
            projects.push(self.project_details(id).await?);
        }
        Ok(projects)
    }

    /// Contribution of `contributor` to a project. Without an explicit
    /// address the connected wallet account is used; `None` when there is
    /// no such account.
    pub async fn contribution(
        &self,
        project_id: u64,
        contributor: Option<Address>,
    ) -> Result<Option<Contribution>> {
        let connection = self.connections.ensure_connection(Access::Read).await?;
        let Some(contributor) = contributor.or(connection.signer()) else {
            info!("No contributor address given and no wallet account connected");
            return Ok(None);
        };

        let amount = connection
            .contract()
            .get_contribution(U256::from(project_id), contributor)
            .await
            .inspect_err(|e| {
                error!("Failed to fetch contribution of {contributor:?} to project {project_id}: {e}")
            })?;

        Ok(Some(Contribution {
            project_id,
            contributor,
            amount,
        }))
    }

    /// Address of the connected wallet account, if any.
    pub async fn current_wallet_address(&self) -> Result<Option<Address>> {
        let connection = self.connections.ensure_connection(Access::Read).await?;
        Ok(connection.signer())
    }

    pub async fn is_read_only(&self) -> bool {
        self.connections.is_read_only().await
    }
}
