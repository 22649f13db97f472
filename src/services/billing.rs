//! Billing reconciliation: Stripe and RevenueCat webhook processing.
//!
//! Two trust models: Stripe events are authenticated by an HMAC signature
//! over the raw payload; RevenueCat events by a shared secret compared in
//! constant time. Both apply paths are idempotent — they derive the target
//! subscription state from the event and a processed-event table
//! short-circuits redeliveries.

use crate::AppCore;
use crate::error::{AppError, Result};
use crate::models::{
    ClientMeta, RevenueCatEventType, RevenueCatWebhook, StripeEvent, SubscriptionScope,
    SubscriptionState, map_product_id,
};
use crate::payments::ProviderSubscription;
use crate::services::subscriptions::{GRACE_PERIOD_MS, apply_provider_snapshot};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Reject events whose signature timestamp drifts beyond this window.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    /// Recognized but intentionally not state-mutating.
    Ignored,
    /// Redelivery of an already-processed event.
    Duplicate,
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>,...`) against the
/// webhook signing secret: HMAC-SHA256 over `"{t}.{payload}"`.
pub fn verify_stripe_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now_secs: i64,
) -> Result<()> {
    // An unset secret must never verify; HMAC with an empty key is forgeable
    // by anyone who knows the endpoint.
    if secret.is_empty() {
        return Err(AppError::InvalidSignature);
    }

    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(AppError::InvalidSignature)?;
    if (now_secs - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::InvalidSignature);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AppError::InvalidSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    for candidate in &candidates {
        if expected.ct_eq(candidate.as_slice()).into() {
            return Ok(());
        }
    }
    Err(AppError::InvalidSignature)
}

fn org_scope_from(value: &Value) -> Result<SubscriptionScope> {
    let org_ref = value["metadata"]["org_id"]
        .as_str()
        .or_else(|| value["subscription_details"]["metadata"]["org_id"].as_str())
        .or_else(|| value["client_reference_id"].as_str())
        .ok_or_else(|| {
            AppError::InvalidInput("event carries no organization reference".into())
        })?;
    let org_id: Uuid = org_ref
        .parse()
        .map_err(|_| AppError::InvalidInput("organization reference is not a uuid".into()))?;
    Ok(SubscriptionScope::Organization(org_id))
}

/// Process a verified-payload Stripe event. Callers handle signature
/// verification first; this function assumes the body is authentic.
pub async fn handle_stripe_event(core: &AppCore, payload: &[u8]) -> Result<WebhookOutcome> {
    let event: StripeEvent = serde_json::from_slice(payload)
        .map_err(|e| AppError::InvalidInput(format!("malformed stripe event: {e}")))?;

    if core.storage.webhook_events.is_processed("stripe", &event.id)? {
        tracing::info!(event_id = %event.id, "skipping redelivered stripe event");
        return Ok(WebhookOutcome::Duplicate);
    }

    let object = &event.data.object;
    let outcome = match event.event_type.as_str() {
        "checkout.session.completed" => {
            let scope = org_scope_from(object)?;
            let subscription_id = object["subscription"]
                .as_str()
                .ok_or_else(|| {
                    AppError::InvalidInput("checkout session has no subscription".into())
                })?
                .to_string();
            let plan_code = object["metadata"]["plan_code"].as_str().map(str::to_owned);

            // The checkout session doesn't carry period details; pull the
            // authoritative snapshot from the provider.
            let snapshot = core
                .payments
                .fetch_subscription(&subscription_id)
                .await
                .map_err(|e| AppError::Provider(e.to_string()))?;
            apply_provider_snapshot(core, scope, &snapshot, plan_code.as_deref())?;
            WebhookOutcome::Applied
        }
        "customer.subscription.updated" | "customer.subscription.deleted" => {
            let scope = org_scope_from(object)?;
            let snapshot = crate::payments::stripe::parse_subscription_object(object)
                .map_err(|e| AppError::InvalidInput(e.to_string()))?;
            apply_provider_snapshot(core, scope, &snapshot, None)?;
            WebhookOutcome::Applied
        }
        "invoice.paid" => {
            let scope = org_scope_from(object)?;
            let period_end_ms = object["period_end"].as_i64().map(|s| s * 1_000);
            core.storage.subscriptions.mutate::<AppError, _>(&scope, |current| {
                let mut sub =
                    current.ok_or_else(|| AppError::NotFound("subscription".into()))?;
                sub.state = SubscriptionState::Active;
                if period_end_ms.is_some() {
                    sub.renew_at = period_end_ms;
                }
                sub.grace_period_ends_at = None;
                Ok(sub)
            })?;
            WebhookOutcome::Applied
        }
        "invoice.payment_failed" => {
            let scope = org_scope_from(object)?;
            let now = chrono::Utc::now().timestamp_millis();
            core.storage.subscriptions.mutate::<AppError, _>(&scope, |current| {
                let mut sub =
                    current.ok_or_else(|| AppError::NotFound("subscription".into()))?;
                sub.state = SubscriptionState::PastDue;
                sub.grace_period_ends_at = Some(now + GRACE_PERIOD_MS);
                Ok(sub)
            })?;
            WebhookOutcome::Applied
        }
        other => {
            tracing::debug!(event_type = other, "ignoring stripe event type");
            WebhookOutcome::Ignored
        }
    };

    if outcome == WebhookOutcome::Applied {
        // Marked after apply: a crash in between costs one extra re-apply,
        // which the derive-target-state paths tolerate.
        core.storage.webhook_events.mark_processed("stripe", &event.id)?;
    }
    Ok(outcome)
}

/// Constant-time shared-secret check for the RevenueCat `Authorization`
/// header. This is deliberately not HMAC; it matches the provider's scheme.
pub fn verify_revenuecat_auth(secret: &str, header: Option<&str>) -> Result<()> {
    let header = header.ok_or_else(|| {
        AppError::Unauthorized("missing Authorization header".into())
    })?;
    if secret.is_empty() {
        return Err(AppError::Unauthorized("webhook secret not configured".into()));
    }
    if header.as_bytes().ct_eq(secret.as_bytes()).into() {
        Ok(())
    } else {
        Err(AppError::Unauthorized("invalid webhook secret".into()))
    }
}

pub fn handle_revenuecat_event(core: &AppCore, payload: &[u8]) -> Result<WebhookOutcome> {
    let webhook: RevenueCatWebhook = serde_json::from_slice(payload)
        .map_err(|e| AppError::InvalidInput(format!("malformed revenuecat event: {e}")))?;
    let event = webhook.event;

    if !event.event_type.requires_subscription_update() {
        tracing::debug!(event_type = ?event.event_type, "ignoring revenuecat event type");
        return Ok(WebhookOutcome::Ignored);
    }

    let user_id: Uuid = event
        .app_user_id
        .parse()
        .map_err(|_| AppError::InvalidInput("app_user_id is not a uuid".into()))?;

    // Unknown products are rejected, never guessed at.
    let product_id = event
        .product_id
        .as_deref()
        .ok_or_else(|| AppError::InvalidInput("event has no product_id".into()))?;
    let mapping = map_product_id(product_id)?;

    // Redeliveries share a transaction id; fall back to the event id for
    // types that carry none.
    let dedup_key = event.transaction_id.as_deref().unwrap_or(&event.id);
    if core
        .storage
        .webhook_events
        .is_processed("revenuecat", dedup_key)?
    {
        tracing::info!(event_id = %event.id, "skipping redelivered revenuecat event");
        return Ok(WebhookOutcome::Duplicate);
    }

    let scope = SubscriptionScope::User(user_id);
    let now = chrono::Utc::now().timestamp_millis();
    core.storage.subscriptions.mutate::<AppError, _>(&scope, |current| {
        let mut sub = current.unwrap_or(crate::models::Subscription {
            scope,
            state: SubscriptionState::Active,
            plan_code: mapping.plan_code.to_string(),
            stripe_subscription_id: None,
            seats: 1,
            started_at: event.purchased_at_ms.unwrap_or(now),
            renew_at: None,
            cancel_at: None,
            ended_at: None,
            grace_period_ends_at: None,
            trial_ends_at: None,
        });

        match event.event_type {
            RevenueCatEventType::InitialPurchase
            | RevenueCatEventType::Renewal
            | RevenueCatEventType::Uncancellation
            | RevenueCatEventType::ProductChange => {
                sub.state = SubscriptionState::Active;
                sub.plan_code = mapping.plan_code.to_string();
                sub.renew_at = event.expiration_at_ms;
                sub.cancel_at = None;
                sub.ended_at = None;
                sub.grace_period_ends_at = None;
            }
            RevenueCatEventType::Cancellation => {
                // Auto-renew turned off; access continues until expiry.
                sub.state = SubscriptionState::Canceled;
                sub.cancel_at = event.expiration_at_ms;
            }
            RevenueCatEventType::Expiration => {
                sub.state = SubscriptionState::Expired;
                sub.ended_at = Some(event.expiration_at_ms.unwrap_or(now));
            }
            RevenueCatEventType::BillingIssue => {
                sub.state = SubscriptionState::PastDue;
                sub.grace_period_ends_at =
                    Some(event.expiration_at_ms.unwrap_or(now + GRACE_PERIOD_MS));
            }
            _ => unreachable!("filtered by requires_subscription_update"),
        }
        Ok(sub)
    })?;

    core.storage
        .webhook_events
        .mark_processed("revenuecat", dedup_key)?;

    let mut details = HashMap::new();
    details.insert("event_id".into(), event.id.clone());
    details.insert("product_id".into(), product_id.to_string());
    super::audit::log_custom_activity(
        core,
        user_id,
        None,
        "subscription.store_event",
        &ClientMeta::default(),
        details,
    );
    Ok(WebhookOutcome::Applied)
}
