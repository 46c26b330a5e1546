//! Axum REST API handlers.
//!
//! A thin forwarding layer over [`CrowdFundGateway`]; the only state it owns
//! is the refresh revision bumped by the event subscriber.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::gateway::CrowdFundGateway;
use crate::models::{Contribution, Project, ProjectStatus, TxOutcome};
use crate::units::format_ether;

#[derive(Clone)]
pub struct ApiState {
    pub gateway: Arc<CrowdFundGateway>,
    /// Bumped on every contract notification; UIs poll it to know when to refetch.
    pub revision: Arc<AtomicU64>,
}

type ApiResult<T> = Result<Json<T>, GatewayError>;

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/revision", get(get_revision))
        .route("/wallet", get(get_wallet))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/:id", get(get_project))
        .route("/projects/:id/contribution", get(get_own_contribution))
        .route("/projects/:id/contributions/:address", get(get_contribution))
        .route("/projects/:id/contribute", post(contribute))
        .route("/projects/:id/claim", post(claim_funds))
        .route("/projects/:id/fail", post(fail_project))
        .route("/projects/:id/refund", post(claim_refund))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: String,
    /// Decimal ETH, e.g. `"1.5"`.
    pub goal_eth: String,
    pub duration_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ContributeRequest {
    pub amount_eth: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RevisionResponse {
    pub revision: u64,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub address: Option<Address>,
    pub read_only: bool,
}

#[derive(Debug, Serialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub status: ProjectStatus,
    pub goal_eth: String,
    pub current_eth: String,
    pub deadline_iso: Option<String>,
}

impl From<Project> for ProjectView {
    fn from(project: Project) -> Self {
        Self {
            status: project.status(Utc::now()),
            goal_eth: format_ether(project.goal_amount),
            current_eth: format_ether(project.current_amount),
            deadline_iso: project.deadline_utc().map(|d| d.to_rfc3339()),
            project,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectsResponse {
    pub count: usize,
    pub projects: Vec<ProjectView>,
}

#[derive(Debug, Serialize)]
pub struct ContributionView {
    #[serde(flatten)]
    pub contribution: Contribution,
    pub amount_eth: String,
}

impl From<Contribution> for ContributionView {
    fn from(contribution: Contribution) -> Self {
        Self {
            amount_eth: format_ether(contribution.amount),
            contribution,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: &'static str,
    pub error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::TransactionRejected(_) => StatusCode::FORBIDDEN,
            GatewayError::TransactionReverted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Network(_) => StatusCode::BAD_GATEWAY,
            GatewayError::WalletUnavailable(_) | GatewayError::Initialization(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                kind: self.kind(),
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /revision`
pub async fn get_revision(State(state): State<Arc<ApiState>>) -> Json<RevisionResponse> {
    Json(RevisionResponse {
        revision: state.revision.load(Ordering::Acquire),
    })
}

/// `GET /wallet`
///
/// Connected account, or `null` when only the read-only endpoint is in use.
pub async fn get_wallet(State(state): State<Arc<ApiState>>) -> ApiResult<WalletResponse> {
    let address = state.gateway.current_wallet_address().await?;
    Ok(Json(WalletResponse {
        address,
        read_only: state.gateway.is_read_only().await,
    }))
}

/// `GET /projects`
pub async fn list_projects(State(state): State<Arc<ApiState>>) -> ApiResult<ProjectsResponse> {
    let projects: Vec<ProjectView> = state
        .gateway
        .list_projects()
        .await?
        .into_iter()
        .map(ProjectView::from)
        .collect();
    Ok(Json(ProjectsResponse {
        count: projects.len(),
        projects,
    }))
}

/// `GET /projects/:id`
pub async fn get_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
) -> ApiResult<ProjectView> {
    let project = state.gateway.project_details(project_id).await?;
    Ok(Json(project.into()))
}

/// `GET /projects/:id/contribution`
///
/// Contribution of the connected wallet account; `null` without one.
pub async fn get_own_contribution(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
) -> ApiResult<Option<ContributionView>> {
    let contribution = state.gateway.contribution(project_id, None).await?;
    Ok(Json(contribution.map(ContributionView::from)))
}

/// `GET /projects/:id/contributions/:address`
pub async fn get_contribution(
    State(state): State<Arc<ApiState>>,
    Path((project_id, contributor)): Path<(u64, Address)>,
) -> ApiResult<Option<ContributionView>> {
    let contribution = state
        .gateway
        .contribution(project_id, Some(contributor))
        .await?;
    Ok(Json(contribution.map(ContributionView::from)))
}

/// `POST /projects`
pub async fn create_project(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateProjectRequest>,
) -> ApiResult<TxOutcome> {
    let receipt = state
        .gateway
        .create_project(&body.name, &body.description, &body.goal_eth, body.duration_secs)
        .await?;
    Ok(Json(TxOutcome::from(&receipt)))
}

/// `POST /projects/:id/contribute`
pub async fn contribute(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
    Json(body): Json<ContributeRequest>,
) -> ApiResult<TxOutcome> {
    let receipt = state.gateway.contribute(project_id, &body.amount_eth).await?;
    Ok(Json(TxOutcome::from(&receipt)))
}

/// `POST /projects/:id/claim`
pub async fn claim_funds(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
) -> ApiResult<TxOutcome> {
    let receipt = state.gateway.claim_funds(project_id).await?;
    Ok(Json(TxOutcome::from(&receipt)))
}

/// `POST /projects/:id/fail`
pub async fn fail_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
) -> ApiResult<TxOutcome> {
    let receipt = state.gateway.fail_project(project_id).await?;
    Ok(Json(TxOutcome::from(&receipt)))
}

/// `POST /projects/:id/refund`
pub async fn claim_refund(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
) -> ApiResult<TxOutcome> {
    let receipt = state.gateway.claim_refund(project_id).await?;
    Ok(Json(TxOutcome::from(&receipt)))
}
