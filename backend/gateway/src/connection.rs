//! Connection manager: picks between the interactive wallet and the
//! read-only fallback endpoint, and caches the result.
//!
//! ## Resolution order
//!
//! * A configured wallet is asked for account access first. If it grants
//!   access the connection can sign (write-capable).
//! * If the wallet refuses, is unreachable, or is not configured, reads fall
//!   back to the fixed remote endpoint (read-only, no signer).
//! * A write that finds a read-only connection cached asks the wallet again;
//!   if that fails the write fails with [`GatewayError::WalletUnavailable`].
//!
//! The manager is an explicit context object: build one per process and pass
//! it by reference (usually inside an `Arc`) to the gateway and subscriber.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use reqwest::Client;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use url::Url;

use crate::config::Config;
use crate::contract::{from_provider_error, CrowdFundContract, EthersCrowdFund};
use crate::errors::{GatewayError, Result};

/// What the caller is about to do with the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Queries only; a read-only connection is acceptable.
    Read,
    /// Transactions; a signer is required.
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Wallet,
    ReadOnly,
}

/// A live connection: network endpoint, optional signer and the contract
/// handle bound to them.
pub struct Connection {
    id: u64,
    kind: ConnectionKind,
    endpoint: String,
    signer: Option<Address>,
    contract: Arc<dyn CrowdFundContract>,
}

impl Connection {
    pub fn wallet(endpoint: impl Into<String>, signer: Address, contract: Arc<dyn CrowdFundContract>) -> Self {
        Self {
            id: 0,
            kind: ConnectionKind::Wallet,
            endpoint: endpoint.into(),
            signer: Some(signer),
            contract,
        }
    }

    pub fn read_only(endpoint: impl Into<String>, contract: Arc<dyn CrowdFundContract>) -> Self {
        Self {
            id: 0,
            kind: ConnectionKind::ReadOnly,
            endpoint: endpoint.into(),
            signer: None,
            contract,
        }
    }

    /// Identifier assigned by the manager; changes whenever the active
    /// connection is replaced.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn signer(&self) -> Option<Address> {
        self.signer
    }

    pub fn can_sign(&self) -> bool {
        self.signer.is_some()
    }

    pub fn contract(&self) -> Arc<dyn CrowdFundContract> {
        self.contract.clone()
    }
}

/// Knows how to reach the wallet and the read-only endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Whether an interactive wallet is available at all.
    fn wallet_installed(&self) -> bool;

    /// Ask the wallet for account access. An error means the wallet refused
    /// or could not be reached.
    async fn request_wallet(&self) -> Result<Connection>;

    async fn read_only(&self) -> Result<Connection>;
}

/// Caches the single active [`Connection`].
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    current: Mutex<Option<Arc<Connection>>>,
    next_id: AtomicU64,
    changes: watch::Sender<u64>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            connector,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            changes,
        }
    }

    /// Return a connection suitable for `access`, creating or upgrading the
    /// cached one when needed.
    pub async fn ensure_connection(&self, access: Access) -> Result<Arc<Connection>> {
        let mut current = self.current.lock().await;

        if let Some(conn) = current.as_ref() {
            if access == Access::Read || conn.can_sign() {
                return Ok(conn.clone());
            }
        }

        let conn = match access {
            Access::Read => self.establish().await?,
            Access::Write => self.establish_signer().await?,
        };
        Ok(self.install(&mut current, conn))
    }

    /// Drop whatever is cached and initialize again, wallet first.
    pub async fn init_provider(&self) -> Result<Arc<Connection>> {
        let mut current = self.current.lock().await;
        let conn = self.establish().await?;
        Ok(self.install(&mut current, conn))
    }

    /// The active connection, if one was established.
    pub async fn current(&self) -> Option<Arc<Connection>> {
        let current = self.current.lock().await.clone();
        if current.is_none() {
            warn!("No connection has been initialized yet");
        }
        current
    }

    /// True when a connection exists but cannot sign.
    pub async fn is_read_only(&self) -> bool {
        matches!(self.current.lock().await.as_ref(), Some(conn) if !conn.can_sign())
    }

    /// Receiver notified with the new connection id whenever the active
    /// connection is replaced.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    async fn establish(&self) -> Result<Connection> {
        if self.connector.wallet_installed() {
            match self.connector.request_wallet().await {
                Ok(conn) => return Ok(conn),
                Err(e) => warn!(
                    "Wallet did not grant account access ({e}); falling back to the read-only endpoint"
                ),
            }
        } else {
            info!("No wallet configured; using the read-only endpoint");
        }
        self.connector.read_only().await
    }

    async fn establish_signer(&self) -> Result<Connection> {
        if !self.connector.wallet_installed() {
            error!("A signature was requested but no wallet is configured");
            return Err(GatewayError::WalletUnavailable(
                "no wallet is configured".to_string(),
            ));
        }
        self.connector.request_wallet().await.map_err(|e| {
            error!("Failed to obtain a signer: {e}");
            match e {
                GatewayError::WalletUnavailable(_) => e,
                other => GatewayError::WalletUnavailable(format!(
                    "wallet connection required for this action: {other}"
                )),
            }
        })
    }

    fn install(&self, slot: &mut Option<Arc<Connection>>, mut conn: Connection) -> Arc<Connection> {
        conn.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(conn);
        info!(
            "Connection #{} established ({:?}, endpoint {}, contract {:?})",
            conn.id,
            conn.kind,
            conn.endpoint,
            conn.contract.address()
        );
        *slot = Some(conn.clone());
        self.changes.send_replace(conn.id);
        conn
    }
}

// ─────────────────────────────────────────────────────────
// ethers-backed connector
// ─────────────────────────────────────────────────────────

/// Reaches the wallet's JSON-RPC channel and the remote read endpoint over
/// HTTP.
///
/// Each side has its own [`reqwest::Client`]. Read requests are cut off after
/// the configured RPC timeout. Wallet requests are only bounded while
/// connecting: `eth_requestAccounts` and `eth_sendTransaction` stay open
/// until the user answers the wallet's prompt.
pub struct EthersConnector {
    contract_address: Address,
    read_rpc_url: String,
    wallet_rpc_url: Option<String>,
    confirmations: usize,
    poll_interval: Duration,
    read_client: Client,
    wallet_client: Client,
}

impl EthersConnector {
    pub fn new(config: &Config) -> Result<Self> {
        let read_client = Client::builder()
            .timeout(config.rpc_timeout())
            .build()
            .map_err(|e| GatewayError::Config(format!("could not build the RPC client: {e}")))?;
        let wallet_client = Client::builder()
            .connect_timeout(config.rpc_timeout())
            .build()
            .map_err(|e| GatewayError::Config(format!("could not build the wallet client: {e}")))?;

        Ok(Self {
            contract_address: config.contract_address,
            read_rpc_url: config.read_rpc_url.clone(),
            wallet_rpc_url: config.wallet_rpc_url.clone(),
            confirmations: config.confirmations,
            poll_interval: config.poll_interval(),
            read_client,
            wallet_client,
        })
    }

    fn provider(&self, url: &str, client: &Client) -> Result<Provider<Http>> {
        let http = Http::new_with_client(Url::parse(url)?, client.clone());
        Ok(Provider::new(http).interval(self.poll_interval))
    }

    fn handle(&self, provider: Provider<Http>) -> Arc<dyn CrowdFundContract> {
        Arc::new(EthersCrowdFund::new(
            self.contract_address,
            Arc::new(provider),
            self.confirmations,
        ))
    }
}

#[async_trait]
impl Connector for EthersConnector {
    fn wallet_installed(&self) -> bool {
        self.wallet_rpc_url.is_some()
    }

    async fn request_wallet(&self) -> Result<Connection> {
        let url = self
            .wallet_rpc_url
            .as_deref()
            .ok_or_else(|| GatewayError::WalletUnavailable("no wallet is configured".to_string()))?;
        let provider = self.provider(url, &self.wallet_client)?;

        let accounts: Vec<Address> = provider
            .request("eth_requestAccounts", serde_json::json!([]))
            .await
            .map_err(|e| GatewayError::WalletUnavailable(from_provider_error(&e).to_string()))?;
        let account = accounts.first().copied().ok_or_else(|| {
            GatewayError::WalletUnavailable("wallet returned no accounts".to_string())
        })?;

        info!("Wallet granted access to account {account:?}");
        let provider = provider.with_sender(account);
        Ok(Connection::wallet(url, account, self.handle(provider)))
    }

    async fn read_only(&self) -> Result<Connection> {
        let provider = self.provider(&self.read_rpc_url, &self.read_client)?;
        info!("Read-only provider configured");
        Ok(Connection::read_only(
            redact_key(&self.read_rpc_url),
            self.handle(provider),
        ))
    }
}

/// Hide the API key of an Alchemy-style `/v2/<key>` endpoint.
fn redact_key(url: &str) -> String {
    match url.split_once("/v2/") {
        Some((base, key)) if !key.is_empty() => {
            let visible: String = key.chars().take(4).collect();
            format!("{base}/v2/{visible}…")
        }
        _ => url.to_string(),
    }
}
