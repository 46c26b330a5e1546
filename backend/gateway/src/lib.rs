//! Client-side gateway to the CrowdFund contract.
//!
//! Resolves a wallet or read-only connection, wraps the contract's methods
//! in typed async calls and turns its notifications into refresh callbacks.

pub mod api;
pub mod config;
pub mod connection;
pub mod contract;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod models;
pub mod subscriber;
pub mod units;

#[cfg(test)]
mod testing;

pub use config::{Config, FeedOptions};
pub use connection::{Access, Connection, ConnectionManager, EthersConnector};
pub use errors::{GatewayError, Result};
pub use events::{ContractEvent, EventKind};
pub use gateway::CrowdFundGateway;
pub use subscriber::{EventFeed, EventSubscriber};
