//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use openbudget_ledger::types::{MAX_MINISTRY_LEN, MAX_TITLE_LEN};
use openbudget_ledger::LedgerError;

use crate::db;
use crate::errors::CoreError;
use crate::models::{MilestoneRow, ProjectRow};
use crate::state::CoreState;

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    pub ministry: String,
    pub total_budget: i64,
}

#[derive(Deserialize)]
pub struct PublishRequest {
    pub ledger_id: String,
}

#[derive(Deserialize)]
pub struct AddMilestoneRequest {
    pub description: String,
    pub amount: u64,
}

#[derive(Deserialize)]
pub struct ReleaseRequest {
    pub proof_url: String,
}

#[derive(Serialize)]
pub struct ProjectResponse {
    #[serde(flatten)]
    pub project: ProjectRow,
    pub milestones: Vec<MilestoneRow>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Present when a confirmed ledger transaction is involved, so the
    /// caller can reconcile against the ledger directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_signature: Option<String>,
}

/// Wrapper that maps [`CoreError`] onto HTTP statuses.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::ReleaseInFlight => StatusCode::CONFLICT,
            CoreError::CacheIntegrity(_) | CoreError::ManualInterventionRequired(_) => {
                StatusCode::CONFLICT
            }
            CoreError::CriticalInconsistency { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Ledger(_) => match self.0.as_program_error() {
                Some(LedgerError::UnauthorizedAccess) => StatusCode::FORBIDDEN,
                Some(
                    LedgerError::InsufficientBudget
                    | LedgerError::InvalidBudget
                    | LedgerError::InvalidTitle
                    | LedgerError::InvalidMinistry
                    | LedgerError::InvalidDescription
                    | LedgerError::InvalidProofUrl
                    | LedgerError::ProjectIdTooLong
                    | LedgerError::MilestoneLimitReached,
                ) => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let tx_signature = match &self.0 {
            CoreError::CriticalInconsistency { signature, .. } => Some(signature.to_hex()),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            tx_signature,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

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

/// `POST /projects`
///
/// Creates a cache-only draft; nothing reaches the ledger until publish.
pub async fn create_project(
    State(state): State<Arc<CoreState>>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.title.is_empty() || req.title.len() > MAX_TITLE_LEN {
        return Err(CoreError::Validation(format!(
            "title must be 1..={MAX_TITLE_LEN} bytes"
        ))
        .into());
    }
    if req.ministry.is_empty() || req.ministry.len() > MAX_MINISTRY_LEN {
        return Err(CoreError::Validation(format!(
            "ministry must be 1..={MAX_MINISTRY_LEN} bytes"
        ))
        .into());
    }
    if req.total_budget <= 0 {
        return Err(CoreError::Validation("total budget must be greater than zero".to_string()).into());
    }

    let row =
        db::create_draft_project(&state.pool, &req.title, &req.ministry, req.total_budget).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// `GET /projects/:id`
pub async fn get_project(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = db::get_project(&state.pool, &id)
        .await?
        .ok_or(CoreError::NotFound("project".to_string()))?;
    let milestones = db::list_milestones(&state.pool, &id).await?;
    Ok(Json(ProjectResponse {
        project,
        milestones,
    }))
}

/// `POST /projects/:id/publish`
pub async fn publish_project(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<String>,
    Json(req): Json<PublishRequest>,
) -> ApiResult<impl IntoResponse> {
    let receipt = crate::publish::publish_project(&state, &id, &req.ledger_id).await?;
    Ok(Json(receipt))
}

/// `POST /projects/:id/milestones`
pub async fn add_milestone(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<String>,
    Json(req): Json<AddMilestoneRequest>,
) -> ApiResult<impl IntoResponse> {
    let row = crate::allocate::add_milestone(&state, &id, &req.description, req.amount).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// `POST /milestones/:id/release`
pub async fn release_milestone(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<String>,
    Json(req): Json<ReleaseRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = crate::release::release_milestone(&state, &id, &req.proof_url).await?;
    Ok(Json(outcome))
}

/// `GET /milestones/:id/verify`
pub async fn verify_milestone(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = crate::reconcile::verify_milestone(&state, &id).await?;
    Ok(Json(report))
}

/// `POST /milestones/:id/sync`
pub async fn sync_milestone(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = crate::reconcile::sync_milestone(&state, &id).await?;
    Ok(Json(report))
}
