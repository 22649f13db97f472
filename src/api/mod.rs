pub mod activity;
pub mod auth;
pub mod billing;
pub mod bulk_email;
pub mod items;
pub mod shares;
pub mod state;
pub mod webhooks;

pub use state::AppState;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/items", post(items::create_item))
        .route(
            "/api/items/{id}",
            get(items::get_item)
                .put(items::update_item)
                .delete(items::delete_item),
        )
        .route(
            "/api/items/{id}/shares",
            get(items::list_shares).post(items::create_share),
        )
        .route("/api/shares", get(shares::list_incoming))
        .route(
            "/api/shares/{id}",
            get(shares::get_share)
                .patch(shares::update_share)
                .delete(shares::revoke_share),
        )
        .route("/api/shares/{id}/reshare", post(shares::reshare))
        .route("/api/plans", get(billing::list_plans))
        .route("/api/orgs/{id}/billing", get(billing::get_billing))
        .route("/api/orgs/{id}/billing/grant", post(billing::grant))
        .route("/api/orgs/{id}/billing/revoke", post(billing::revoke))
        .route("/api/orgs/{id}/billing/cancel", post(billing::cancel))
        .route("/api/orgs/{id}/billing/reactivate", post(billing::reactivate))
        .route("/api/orgs/{id}/billing/seats", post(billing::update_seats))
        .route("/api/orgs/{id}/billing/checkout", post(billing::create_checkout))
        .route("/api/orgs/{id}/billing/sync", post(billing::sync))
        .route("/api/webhooks/stripe", post(webhooks::stripe))
        .route("/api/webhooks/revenuecat", post(webhooks::revenuecat))
        .route("/api/bulk-email", post(bulk_email::submit))
        .route("/api/bulk-email/{job_id}", get(bulk_email::get_status))
        .route("/api/orgs/{id}/activity", get(activity::list_activity))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
