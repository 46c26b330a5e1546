//! In-memory contract and connector doubles for unit tests, plus a local
//! JSON-RPC node for exercising the ethers-backed types.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::post;
use axum::{Json, Router};
use ethers::types::{Address, TransactionReceipt, H256, U256, U64};
use serde_json::{json, Value};

use crate::connection::{Connection, Connector};
use crate::contract::{CrowdFundContract, ProjectDetailsTuple, WriteCall};
use crate::errors::{GatewayError, Result};
use crate::events::{ContractEvent, EventKind};

pub const CONTRACT: Address = Address::repeat_byte(0xcf);
pub const ACCOUNT: Address = Address::repeat_byte(0xaa);

#[derive(Default)]
struct ChainState {
    projects: BTreeMap<U256, ProjectDetailsTuple>,
    contributions: BTreeMap<(U256, Address), U256>,
    submitted: Vec<WriteCall>,
    fail_next_write: Option<GatewayError>,
    fail_reads: Option<GatewayError>,
    block: u64,
    events: Vec<(u64, ContractEvent)>,
    log_range_limit: Option<u64>,
    fail_logs_from: Option<u64>,
}

/// A contract whose state lives in memory.
#[derive(Default)]
pub struct MockCrowdFund {
    state: Mutex<ChainState>,
}

impl MockCrowdFund {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_project(&self, id: u64, details: ProjectDetailsTuple) {
        self.state.lock().unwrap().projects.insert(U256::from(id), details);
    }

    pub fn set_contribution(&self, id: u64, contributor: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .contributions
            .insert((U256::from(id), contributor), amount);
    }

    pub fn fail_next_write(&self, err: GatewayError) {
        self.state.lock().unwrap().fail_next_write = Some(err);
    }

    pub fn fail_reads(&self, err: GatewayError) {
        self.state.lock().unwrap().fail_reads = Some(err);
    }

    pub fn submitted(&self) -> Vec<WriteCall> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// Mine a block carrying one event.
    pub fn emit(&self, kind: EventKind, project_id: u64) {
        let mut state = self.state.lock().unwrap();
        state.block += 1;
        let block = state.block;
        let mut event = ContractEvent::new(kind, Some(project_id));
        event.block_number = Some(block);
        event.tx_hash = Some(H256::from_low_u64_be(block));
        event.log_index = Some(0);
        state.events.push((block, event));
    }

    /// Reject log requests spanning more than `blocks` blocks, as hosted
    /// providers do.
    pub fn limit_log_range(&self, blocks: u64) {
        self.state.lock().unwrap().log_range_limit = Some(blocks);
    }

    /// Fail log requests reaching `block` or beyond.
    pub fn fail_logs_from(&self, block: Option<u64>) {
        self.state.lock().unwrap().fail_logs_from = block;
    }

    /// Mine an empty block.
    pub fn mine(&self) {
        self.state.lock().unwrap().block += 1;
    }

    fn check_reads(&self) -> Result<()> {
        match &self.state.lock().unwrap().fail_reads {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// A project tuple the way `getProjectDetails` returns it.
pub fn project_tuple(name: &str, goal: u64, current: u64, closed: bool) -> ProjectDetailsTuple {
    (
        ACCOUNT,
        name.to_string(),
        format!("{name} description"),
        U256::from(goal),
        U256::from(1_900_000_000u64),
        U256::from(current),
        current >= goal,
        closed,
    )
}

#[async_trait]
impl CrowdFundContract for MockCrowdFund {
    fn address(&self) -> Address {
        CONTRACT
    }

    async fn submit(&self, call: WriteCall) -> Result<TransactionReceipt> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next_write.take() {
            return Err(err);
        }
        state.submitted.push(call);
        state.block += 1;
        Ok(TransactionReceipt {
            transaction_hash: H256::from_low_u64_be(state.submitted.len() as u64),
            block_number: Some(U64::from(state.block)),
            status: Some(U64::one()),
            ..Default::default()
        })
    }

    async fn get_project_details(&self, project_id: U256) -> Result<ProjectDetailsTuple> {
        self.check_reads()?;
        self.state
            .lock()
            .unwrap()
            .projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| GatewayError::TransactionReverted {
                reason: "execution reverted: Project does not exist".to_string(),
                tx_hash: None,
            })
    }

    async fn get_all_project_ids(&self) -> Result<Vec<U256>> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().projects.keys().copied().collect())
    }

    async fn get_contribution(&self, project_id: U256, contributor: Address) -> Result<U256> {
        self.check_reads()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .contributions
            .get(&(project_id, contributor))
            .copied()
            .unwrap_or_default())
    }

    async fn block_number(&self) -> Result<u64> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().block)
    }

    async fn events_between(&self, from_block: u64, to_block: u64) -> Result<Vec<ContractEvent>> {
        let state = self.state.lock().unwrap();
        if let Some(limit) = state.log_range_limit {
            if to_block - from_block + 1 > limit {
                return Err(GatewayError::Network(format!(
                    "log response size exceeded: ranges are limited to {limit} blocks"
                )));
            }
        }
        if state.fail_logs_from.map_or(false, |block| to_block >= block) {
            return Err(GatewayError::Network("request timed out".to_string()));
        }
        Ok(state
            .events
            .iter()
            .filter(|(block, _)| (from_block..=to_block).contains(block))
            .map(|(_, event)| event.clone())
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletBehaviour {
    /// No wallet configured.
    Absent,
    /// Wallet present, account access granted.
    Grants,
    /// Wallet present, account access refused.
    Denies,
}

/// Connector that hands out connections over one shared [`MockCrowdFund`].
pub struct MockConnector {
    contract: Arc<MockCrowdFund>,
    wallet: Mutex<WalletBehaviour>,
    wallet_requests: AtomicUsize,
    read_only_calls: AtomicUsize,
}

impl MockConnector {
    pub fn new(contract: Arc<MockCrowdFund>, wallet: WalletBehaviour) -> Self {
        Self {
            contract,
            wallet: Mutex::new(wallet),
            wallet_requests: AtomicUsize::new(0),
            read_only_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_wallet(&self, wallet: WalletBehaviour) {
        *self.wallet.lock().unwrap() = wallet;
    }

    pub fn wallet_requests(&self) -> usize {
        self.wallet_requests.load(Ordering::SeqCst)
    }

    pub fn read_only_calls(&self) -> usize {
        self.read_only_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn wallet_installed(&self) -> bool {
        *self.wallet.lock().unwrap() != WalletBehaviour::Absent
    }

    async fn request_wallet(&self) -> Result<Connection> {
        self.wallet_requests.fetch_add(1, Ordering::SeqCst);
        let wallet = *self.wallet.lock().unwrap();
        match wallet {
            WalletBehaviour::Grants => Ok(Connection::wallet(
                "mock://wallet",
                ACCOUNT,
                self.contract.clone(),
            )),
            WalletBehaviour::Denies => Err(GatewayError::WalletUnavailable(
                "User rejected the request.".to_string(),
            )),
            WalletBehaviour::Absent => Err(GatewayError::WalletUnavailable(
                "no wallet is configured".to_string(),
            )),
        }
    }

    async fn read_only(&self) -> Result<Connection> {
        self.read_only_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Connection::read_only("mock://read-only", self.contract.clone()))
    }
}

/// What the local node answers to one JSON-RPC request.
#[derive(Debug, Clone)]
pub enum RpcReply {
    Result(Value),
    Error(Value),
}

pub fn rpc_error(code: i64, message: &str, data: Option<Value>) -> RpcReply {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    RpcReply::Error(error)
}

/// Serve JSON-RPC on a loopback port, answering each request after `delay`.
/// Returns the node's URL.
pub async fn rpc_node<F>(delay: Duration, answer: F) -> String
where
    F: Fn(&str, &Value) -> RpcReply + Send + Sync + 'static,
{
    let answer = Arc::new(answer);
    let app = Router::new().route(
        "/",
        post(move |Json(request): Json<Value>| {
            let answer = answer.clone();
            async move {
                tokio::time::sleep(delay).await;
                let method = request["method"].as_str().unwrap_or_default();
                let mut response = json!({ "jsonrpc": "2.0", "id": request["id"] });
                match answer(method, &request["params"]) {
                    RpcReply::Result(value) => response["result"] = value,
                    RpcReply::Error(error) => response["error"] = error,
                }
                Json(response)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
