//! Contract and signing handlers

use crate::error::{ApiError, ApiResult};
use crate::state::ServiceState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use dualsign_core::{
    ContractDraft, ContractRecord, FinalizationReport, Party, SignatureRecord, SigningOutcome,
    SubmittedSignature,
};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub storage_backend: String,
    pub countersign_enabled: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<ServiceState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        service: "dualsignd".to_string(),
        version: state.version.clone(),
        storage_backend: state.storage_backend.to_string(),
        countersign_enabled: state.countersign_enabled(),
        started_at: state.started_at,
    })
}

/// Create a pending contract
pub async fn create_contract(
    State(state): State<ServiceState>,
    Json(draft): Json<ContractDraft>,
) -> ApiResult<(StatusCode, Json<ContractRecord>)> {
    let record = state
        .orchestrator
        .create_contract(draft)
        .await
        .map_err(ApiError::Creation)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_contract(
    State(state): State<ServiceState>,
    Path(document_id): Path<String>,
) -> ApiResult<Json<ContractRecord>> {
    Ok(Json(state.orchestrator.get_contract(&document_id).await?))
}

#[derive(Debug, Serialize)]
pub struct SignatureListResponse {
    pub document_id: String,
    pub signatures: Vec<SignatureRecord>,
}

/// Current signatures, ordered by role
pub async fn list_signatures(
    State(state): State<ServiceState>,
    Path(document_id): Path<String>,
) -> ApiResult<Json<SignatureListResponse>> {
    let signatures = state.orchestrator.list_signatures(&document_id).await?;
    Ok(Json(SignatureListResponse {
        document_id,
        signatures,
    }))
}

/// Signing request body
#[derive(Debug, Deserialize)]
pub struct SignRequest {
    #[serde(default)]
    pub signatures: Vec<SubmittedSignature>,
}

pub async fn sign_customer(
    State(state): State<ServiceState>,
    Path(document_id): Path<String>,
    Json(request): Json<SignRequest>,
) -> ApiResult<Json<SigningOutcome>> {
    sign(&state, &document_id, Party::Customer, request).await
}

pub async fn sign_company(
    State(state): State<ServiceState>,
    Path(document_id): Path<String>,
    Json(request): Json<SignRequest>,
) -> ApiResult<Json<SigningOutcome>> {
    sign(&state, &document_id, Party::Company, request).await
}

async fn sign(
    state: &ServiceState,
    document_id: &str,
    party: Party,
    request: SignRequest,
) -> ApiResult<Json<SigningOutcome>> {
    let outcome = state
        .orchestrator
        .attempt_sign(document_id, party, request.signatures)
        .await?;
    Ok(Json(outcome))
}

/// Retry finalization of a completed contract
pub async fn finalize_contract(
    State(state): State<ServiceState>,
    Path(document_id): Path<String>,
) -> ApiResult<Json<FinalizationReport>> {
    Ok(Json(state.orchestrator.finalize(&document_id).await?))
}
