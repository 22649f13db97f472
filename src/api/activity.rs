use crate::api::auth::CallerId;
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::ActivityEntry;
use crate::services;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

// GET /api/orgs/{id}/activity
pub async fn list_activity(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityEntry>>> {
    let entries = services::audit::list_activity(
        &state.core,
        user_id,
        org_id,
        query.limit.unwrap_or(100),
    )?;
    Ok(Json(entries))
}
