use crate::api::auth::CallerId;
use crate::api::state::AppState;
use crate::error::Result;
use crate::services;
use crate::services::bulk_email::{BulkEmailJob, SubmitResult};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct BulkEmailRequest {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

// POST /api/bulk-email
pub async fn submit(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(payload): Json<BulkEmailRequest>,
) -> Result<(StatusCode, Json<SubmitResult>)> {
    let result = services::bulk_email::submit(
        &state.core,
        payload.recipients,
        payload.subject,
        payload.body,
    )?;
    tracing::info!(job_id = %result.job_id, submitted_by = %user_id, "bulk email job accepted");
    Ok((StatusCode::ACCEPTED, Json(result)))
}

// GET /api/bulk-email/{job_id}
pub async fn get_status(
    State(state): State<AppState>,
    CallerId(_user_id): CallerId,
    Path(job_id): Path<Uuid>,
) -> Result<Json<BulkEmailJob>> {
    let job = services::bulk_email::get_status(&state.core, job_id)?;
    Ok(Json(job))
}
