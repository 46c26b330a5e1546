//! Canonical event types emitted by the crowdfunding contract.
//!
//! Events are recognised by their signature topic only. The project id is
//! the one field pulled out of a log; everything else stays undecoded
//! because the refresh callback never looks at it.

use std::sync::OnceLock;

use ethers::types::{Log, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// All recognised event kinds from the crowdfunding contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new project was registered.
    ProjectCreated,
    /// Someone sent funds to a project.
    ContributionMade,
    /// The creator withdrew the funds of a successful project.
    FundsClaimed,
    /// A contributor took their money back from a failed project.
    FundsRefunded,
    /// A project was marked failed after its deadline.
    ProjectFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::ProjectCreated,
        EventKind::ContributionMade,
        EventKind::FundsClaimed,
        EventKind::FundsRefunded,
        EventKind::ProjectFailed,
    ];

    /// Canonical Solidity event signature.
    pub fn signature(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "ProjectCreated(uint256,address,string,uint256,uint256)",
            Self::ContributionMade => "ContributionMade(uint256,address,uint256)",
            Self::FundsClaimed => "FundsClaimed(uint256,address,uint256)",
            Self::FundsRefunded => "FundsRefunded(uint256,address,uint256)",
            Self::ProjectFailed => "ProjectFailed(uint256)",
        }
    }

    /// The log topic0 for this event (keccak256 of the signature).
    pub fn topic(&self) -> H256 {
        static TOPICS: OnceLock<[H256; 5]> = OnceLock::new();
        let topics = TOPICS.get_or_init(|| {
            EventKind::ALL.map(|kind| H256::from(keccak256(kind.signature().as_bytes())))
        });
        topics[*self as usize]
    }

    /// Map a log's topic0 back to an [`EventKind`].
    pub fn from_topic(topic: &H256) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == *topic)
    }

    /// Return a short identifier string suitable for logs and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project_created",
            Self::ContributionMade => "contribution_made",
            Self::FundsClaimed => "funds_claimed",
            Self::FundsRefunded => "funds_refunded",
            Self::ProjectFailed => "project_failed",
        }
    }
}

/// One contract notification, as yielded by an event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractEvent {
    pub kind: EventKind,
    pub project_id: Option<u64>,
    pub block_number: Option<u64>,
    pub tx_hash: Option<H256>,
    /// Position of the log within its block.
    pub log_index: Option<u64>,
}

impl ContractEvent {
    pub fn new(kind: EventKind, project_id: Option<u64>) -> Self {
        Self {
            kind,
            project_id,
            block_number: None,
            tx_hash: None,
            log_index: None,
        }
    }

    /// Whether both values describe the same on-chain log.
    ///
    /// Logs are told apart by transaction and log index; without those the
    /// whole notification has to match.
    pub fn same_occurrence(&self, other: &Self) -> bool {
        match (self.tx_hash, self.log_index, other.tx_hash, other.log_index) {
            (Some(tx), Some(index), Some(other_tx), Some(other_index)) => {
                tx == other_tx && index == other_index
            }
            _ => self == other,
        }
    }

    /// Decode a raw log. Returns `None` for logs that are not one of the
    /// five crowdfunding notifications.
    pub fn from_log(log: &Log) -> Option<Self> {
        let kind = EventKind::from_topic(log.topics.first()?)?;

        // projectId is the first parameter of every event: topic1 when it is
        // indexed, otherwise the first ABI word of the data.
        let raw_id = match log.topics.get(1) {
            Some(topic) => Some(U256::from_big_endian(topic.as_bytes())),
            None if log.data.len() >= 32 => Some(U256::from_big_endian(&log.data[..32])),
            None => None,
        };
        let project_id = raw_id.filter(|id| *id <= U256::from(u64::MAX)).map(|id| id.as_u64());

        Some(Self {
            kind,
            project_id,
            block_number: log.block_number.map(|n| n.as_u64()),
            tx_hash: log.transaction_hash,
            log_index: log
                .log_index
                .filter(|index| *index <= U256::from(u64::MAX))
                .map(|index| index.as_u64()),
        })
    }
}
