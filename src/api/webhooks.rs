//! Provider webhook endpoints.
//!
//! Stripe is acknowledged with 200 even when the signature check fails, so a
//! misconfigured secret does not make Stripe retry a poison delivery forever;
//! the rejection is logged and the body says `rejected`. RevenueCat expects a
//! plain 401 on a bad shared secret, so that one surfaces as an error.

use crate::api::state::AppState;
use crate::error::Result;
use crate::services;
use crate::services::billing::WebhookOutcome;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

// POST /api/webhooks/stripe
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let now_secs = chrono::Utc::now().timestamp();

    if let Err(err) = services::billing::verify_stripe_signature(
        &state.core.config.stripe_webhook_secret,
        &body,
        signature,
        now_secs,
    ) {
        tracing::warn!(error = %err, "rejected stripe webhook with bad signature");
        return Ok(Json(json!({ "status": "rejected" })));
    }

    let outcome = services::billing::handle_stripe_event(&state.core, &body).await?;
    Ok(Json(json!({ "status": "ok", "outcome": outcome })))
}

// POST /api/webhooks/revenuecat
pub async fn revenuecat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
    services::billing::verify_revenuecat_auth(&state.core.config.revenuecat_secret, auth)?;

    let outcome: WebhookOutcome = services::billing::handle_revenuecat_event(&state.core, &body)?;
    Ok(Json(json!({ "status": "ok", "outcome": outcome })))
}
