use crate::api::auth::CallerId;
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::{ClientMeta, ItemShare, ShareOutcome};
use crate::services;
use crate::services::shares::{CreateShareRequest, ShareView, UpdatePermissionsRequest};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

// GET /api/shares
pub async fn list_incoming(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> Result<Json<Vec<ItemShare>>> {
    let shares = services::shares::list_incoming(&state.core, user_id)?;
    Ok(Json(shares))
}

// GET /api/shares/{id}
pub async fn get_share(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(share_id): Path<Uuid>,
) -> Result<Json<ShareView>> {
    let view = services::shares::get(&state.core, user_id, share_id)?;
    Ok(Json(view))
}

// PATCH /api/shares/{id}
pub async fn update_share(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    meta: ClientMeta,
    Path(share_id): Path<Uuid>,
    Json(payload): Json<UpdatePermissionsRequest>,
) -> Result<Json<ItemShare>> {
    let share =
        services::shares::update_permissions(&state.core, user_id, &meta, share_id, payload)?;
    Ok(Json(share))
}

// DELETE /api/shares/{id}
pub async fn revoke_share(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    meta: ClientMeta,
    Path(share_id): Path<Uuid>,
) -> Result<StatusCode> {
    services::shares::revoke(&state.core, user_id, &meta, share_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/shares/{id}/reshare
pub async fn reshare(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    meta: ClientMeta,
    Path(share_id): Path<Uuid>,
    Json(payload): Json<CreateShareRequest>,
) -> Result<(StatusCode, Json<ShareOutcome>)> {
    let outcome =
        services::shares::reshare(&state.core, user_id, &meta, share_id, payload).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
