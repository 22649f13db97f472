use crate::api::auth::CallerId;
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::{ClientMeta, Item, ItemShare, ShareOutcome};
use crate::services;
use crate::services::items::{CreateItemRequest, UpdateItemRequest};
use crate::services::shares::CreateShareRequest;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

// POST /api/items
pub async fn create_item(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(payload): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<Item>)> {
    let item = services::items::create_item(&state.core, user_id, payload)?;
    Ok((StatusCode::CREATED, Json(item)))
}

// GET /api/items/{id}
pub async fn get_item(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Item>> {
    let item = services::items::get_item(&state.core, user_id, item_id)?;
    Ok(Json(item))
}

// PUT /api/items/{id}
pub async fn update_item(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<Json<Item>> {
    let item = services::items::update_item(&state.core, user_id, item_id, payload)?;
    Ok(Json(item))
}

// DELETE /api/items/{id}
pub async fn delete_item(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode> {
    services::items::delete_item(&state.core, user_id, item_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/items/{id}/shares
pub async fn list_shares(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Vec<ItemShare>>> {
    let shares = services::shares::list_for_item(&state.core, user_id, item_id)?;
    Ok(Json(shares))
}

// POST /api/items/{id}/shares
pub async fn create_share(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    meta: ClientMeta,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<CreateShareRequest>,
) -> Result<(StatusCode, Json<ShareOutcome>)> {
    let outcome = services::shares::create(&state.core, user_id, &meta, item_id, payload).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
