use crate::api::auth::CallerId;
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::{ClientMeta, Plan, Subscription};
use crate::payments::CheckoutSession;
use crate::services;
use crate::services::subscriptions::BillingInfo;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub plan_code: String,
    pub ends_at: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeatsRequest {
    pub seats: u32,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_code: String,
    #[serde(default = "default_seats")]
    pub seats: u32,
}

fn default_seats() -> u32 {
    1
}

// GET /api/plans
pub async fn list_plans(
    State(state): State<AppState>,
    CallerId(_user_id): CallerId,
) -> Result<Json<Vec<Plan>>> {
    let plans = services::subscriptions::list_plans(&state.core)?;
    Ok(Json(plans))
}

// GET /api/orgs/{id}/billing
pub async fn get_billing(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(org_id): Path<Uuid>,
) -> Result<Json<BillingInfo>> {
    let info = services::subscriptions::get_billing_info(&state.core, user_id, org_id)?;
    Ok(Json(info))
}

// POST /api/orgs/{id}/billing/grant
pub async fn grant(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    meta: ClientMeta,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<GrantRequest>,
) -> Result<Json<Subscription>> {
    let sub = services::subscriptions::grant_manual(
        &state.core,
        user_id,
        &meta,
        org_id,
        &payload.plan_code,
        payload.ends_at,
        payload.reason.as_deref(),
    )?;
    Ok(Json(sub))
}

// POST /api/orgs/{id}/billing/revoke
pub async fn revoke(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    meta: ClientMeta,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<RevokeRequest>,
) -> Result<Json<Subscription>> {
    let sub = services::subscriptions::revoke_manual(
        &state.core,
        user_id,
        &meta,
        org_id,
        payload.reason.as_deref(),
    )?;
    Ok(Json(sub))
}

// POST /api/orgs/{id}/billing/cancel
pub async fn cancel(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    meta: ClientMeta,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Subscription>> {
    let sub = services::subscriptions::cancel(&state.core, user_id, &meta, org_id).await?;
    Ok(Json(sub))
}

// POST /api/orgs/{id}/billing/reactivate
pub async fn reactivate(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    meta: ClientMeta,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Subscription>> {
    let sub = services::subscriptions::reactivate(&state.core, user_id, &meta, org_id).await?;
    Ok(Json(sub))
}

// POST /api/orgs/{id}/billing/seats
pub async fn update_seats(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    meta: ClientMeta,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<SeatsRequest>,
) -> Result<Json<Subscription>> {
    let sub = services::subscriptions::update_seats(
        &state.core,
        user_id,
        &meta,
        org_id,
        payload.seats,
    )
    .await?;
    Ok(Json(sub))
}

// POST /api/orgs/{id}/billing/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    meta: ClientMeta,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>> {
    let session = services::subscriptions::create_checkout(
        &state.core,
        user_id,
        &meta,
        org_id,
        &payload.plan_code,
        payload.seats,
    )
    .await?;
    Ok(Json(session))
}

// POST /api/orgs/{id}/billing/sync
pub async fn sync(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Subscription>> {
    let sub = services::subscriptions::sync(&state.core, user_id, org_id).await?;
    Ok(Json(sub))
}
