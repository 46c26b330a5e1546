//! Named records for contract read results.
//!
//! The contract answers with positional tuples; these types are the only
//! shape that travels further into the crate.

use chrono::{DateTime, TimeZone, Utc};
use ethers::types::{Address, TransactionReceipt, H256, U256};
use serde::Serialize;

use crate::contract::ProjectDetailsTuple;
use crate::errors::{GatewayError, Result};
use crate::units::serialize_decimal;

/// Snapshot of one project as stored on-chain. Amounts are in wei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: u64,
    pub creator: Address,
    pub name: String,
    pub description: String,
    #[serde(serialize_with = "serialize_decimal")]
    pub goal_amount: U256,
    /// Unix timestamp (seconds).
    pub deadline: u64,
    #[serde(serialize_with = "serialize_decimal")]
    pub current_amount: U256,
    pub funding_goal_reached: bool,
    pub closed: bool,
}

/// Display status derived from a project snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Before the deadline and still collecting.
    Open,
    /// Goal reached, funds not yet claimed.
    Successful,
    /// Deadline passed without reaching the goal.
    Failed,
    /// Funds claimed or project marked failed on-chain.
    Closed,
}

impl Project {
    pub fn from_details(id: u64, details: ProjectDetailsTuple) -> Result<Self> {
        let (creator, name, description, goal_amount, deadline, current_amount, funding_goal_reached, closed) =
            details;
        Ok(Self {
            id,
            creator,
            name,
            description,
            goal_amount,
            deadline: narrow(deadline, "deadline")?,
            current_amount,
            funding_goal_reached,
            closed,
        })
    }

    pub fn deadline_utc(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.deadline)
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn status(&self, now: DateTime<Utc>) -> ProjectStatus {
        if self.closed {
            ProjectStatus::Closed
        } else if self.funding_goal_reached {
            ProjectStatus::Successful
        } else if self.deadline_utc().map_or(false, |deadline| now >= deadline) {
            ProjectStatus::Failed
        } else {
            ProjectStatus::Open
        }
    }
}

/// How much one address has put into one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub project_id: u64,
    pub contributor: Address,
    #[serde(serialize_with = "serialize_decimal")]
    pub amount: U256,
}

/// The part of a confirmed receipt worth showing to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxOutcome {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub gas_used: Option<String>,
}

impl From<&TransactionReceipt> for TxOutcome {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            gas_used: receipt.gas_used.map(|g| g.to_string()),
        }
    }
}

/// Narrow an on-chain integer to `u64`, refusing values that do not fit.
pub fn narrow(value: U256, what: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(GatewayError::InvalidInput(format!(
            "{what} {value} does not fit into 64 bits"
        )));
    }
    Ok(value.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{project_tuple, ACCOUNT};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn maps_positional_tuple_to_named_fields() {
        let project = Project::from_details(2, project_tuple("Solar roof", 100, 40, false)).unwrap();
        assert_eq!(project.id, 2);
        assert_eq!(project.creator, ACCOUNT);
        assert_eq!(project.name, "Solar roof");
        assert_eq!(project.description, "Solar roof description");
        assert_eq!(project.goal_amount, U256::from(100));
        assert_eq!(project.current_amount, U256::from(40));
        assert_eq!(project.deadline, 1_900_000_000);
        assert!(!project.funding_goal_reached);
        assert!(!project.closed);
    }

    #[test]
    fn oversized_deadline_is_rejected() {
        let mut details = project_tuple("x", 1, 0, false);
        details.4 = U256::MAX;
        let err = Project::from_details(1, details).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    #[test]
    fn status_follows_flags_and_deadline() {
        let open = Project::from_details(1, project_tuple("a", 100, 10, false)).unwrap();
        assert_eq!(open.status(at(1_000_000_000)), ProjectStatus::Open);
        assert_eq!(open.status(at(1_900_000_000)), ProjectStatus::Failed);

        let funded = Project::from_details(2, project_tuple("b", 100, 100, false)).unwrap();
        assert_eq!(funded.status(at(1_950_000_000)), ProjectStatus::Successful);

        let closed = Project::from_details(3, project_tuple("c", 100, 100, true)).unwrap();
        assert_eq!(closed.status(at(1_000_000_000)), ProjectStatus::Closed);
    }

    #[test]
    fn amounts_serialize_as_decimal_strings() {
        let mut details = project_tuple("big", 0, 0, false);
        details.3 = U256::exp10(24);
        let project = Project::from_details(7, details).unwrap();
        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["goal_amount"], "1000000000000000000000000");
        assert_eq!(json["closed"], false);
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn narrow_accepts_u64_max() {
        assert_eq!(narrow(U256::from(u64::MAX), "id").unwrap(), u64::MAX);
        assert!(narrow(U256::from(u64::MAX) + 1, "id").is_err());
    }
}
