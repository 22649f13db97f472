//! Subscription state machine.
//!
//! Two control planes can own a subscription row: manual admin grants and
//! Stripe. `stripe_subscription_id = None` marks the manual plane, and the
//! manual code paths refuse to touch a Stripe-linked row
//! (`AppError::StripeManaged`). Every mutation runs inside
//! `SubscriptionStorage::mutate`, so racing admin actions and webhook
//! deliveries serialize on the row.
//!
//! Manual grants are not eagerly expired here: a background worker is
//! expected to flip `Active -> Expired` once `renew_at` passes.

use crate::AppCore;
use crate::error::{AppError, Result};
use crate::models::{ClientMeta, Plan, Subscription, SubscriptionScope, SubscriptionState};
use crate::payments::{CheckoutSession, ProviderSubscription};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Grace window after a failed payment.
pub const GRACE_PERIOD_MS: i64 = 14 * 24 * 60 * 60 * 1_000;

#[derive(Debug, Serialize)]
pub struct BillingInfo {
    pub state: SubscriptionState,
    pub plan_code: String,
    pub seats: u32,
    /// Next renewal for Stripe-managed rows; hard expiry for manual grants.
    pub renew_at: Option<i64>,
    pub cancel_at: Option<i64>,
    pub grace_period_ends_at: Option<i64>,
    pub stripe_managed: bool,
}

fn require_admin(core: &AppCore, org_id: &Uuid, user_id: &Uuid) -> Result<()> {
    if core.storage.organizations.get(org_id)?.is_none() {
        return Err(AppError::NotFound("organization".into()));
    }
    if !core.storage.organizations.is_admin(org_id, user_id)? {
        return Err(AppError::Forbidden(
            "only organization admins may manage billing".into(),
        ));
    }
    Ok(())
}

fn require_active_plan(core: &AppCore, plan_code: &str) -> Result<Plan> {
    let plan = core
        .storage
        .plans
        .get_by_code(plan_code)?
        .ok_or_else(|| AppError::NotFound("plan".into()))?;
    if !plan.is_active {
        return Err(AppError::InvalidInput(format!(
            "plan {plan_code} is not active"
        )));
    }
    Ok(plan)
}

fn audit_transition(
    core: &AppCore,
    actor: Uuid,
    meta: &ClientMeta,
    org_id: Uuid,
    activity: &str,
    old_plan: Option<&str>,
    new_plan: &str,
    reason: Option<&str>,
    extra: HashMap<String, String>,
) {
    let mut details = extra;
    details.insert("old_plan".into(), old_plan.unwrap_or("-").to_string());
    details.insert("new_plan".into(), new_plan.to_string());
    if let Some(reason) = reason {
        details.insert("reason".into(), reason.to_string());
    }
    super::audit::log_custom_activity(core, actor, Some(org_id), activity, meta, details);
}

/// Admin-issued entitlement with no payment behind it. `ends_at` lands in
/// `renew_at` — for manual grants that field means "hard expiry", not "next
/// renewal".
pub fn grant_manual(
    core: &AppCore,
    acting_user_id: Uuid,
    meta: &ClientMeta,
    org_id: Uuid,
    plan_code: &str,
    ends_at: i64,
    reason: Option<&str>,
) -> Result<Subscription> {
    require_admin(core, &org_id, &acting_user_id)?;
    require_active_plan(core, plan_code)?;

    let now = chrono::Utc::now().timestamp_millis();
    if ends_at <= now {
        return Err(AppError::InvalidInput(
            "ends_at must be in the future".into(),
        ));
    }

    let scope = SubscriptionScope::Organization(org_id);
    let mut old_plan = None;
    let sub = core.storage.subscriptions.mutate(&scope, |current| {
        if let Some(existing) = &current
            && existing.is_stripe_managed()
        {
            return Err(AppError::StripeManaged);
        }
        old_plan = current.as_ref().map(|s| s.plan_code.clone());
        let started_at = current.map(|s| s.started_at).unwrap_or(now);
        Ok(Subscription {
            scope,
            state: SubscriptionState::Active,
            plan_code: plan_code.to_string(),
            stripe_subscription_id: None,
            seats: 1,
            started_at,
            renew_at: Some(ends_at),
            cancel_at: None,
            ended_at: None,
            grace_period_ends_at: None,
            trial_ends_at: None,
        })
    })?;

    audit_transition(
        core,
        acting_user_id,
        meta,
        org_id,
        "subscription.manual_grant",
        old_plan.as_deref(),
        plan_code,
        reason,
        HashMap::new(),
    );
    Ok(sub)
}

/// Ends a manual grant. Refuses Stripe-managed rows like `grant_manual`.
pub fn revoke_manual(
    core: &AppCore,
    acting_user_id: Uuid,
    meta: &ClientMeta,
    org_id: Uuid,
    reason: Option<&str>,
) -> Result<Subscription> {
    require_admin(core, &org_id, &acting_user_id)?;

    let scope = SubscriptionScope::Organization(org_id);
    let mut plan_code = String::new();
    let sub = core.storage.subscriptions.mutate(&scope, |current| {
        let mut sub = current.ok_or_else(|| AppError::NotFound("subscription".into()))?;
        if sub.is_stripe_managed() {
            return Err(AppError::StripeManaged);
        }
        plan_code = sub.plan_code.clone();
        sub.state = SubscriptionState::Expired;
        sub.ended_at = Some(chrono::Utc::now().timestamp_millis());
        Ok(sub)
    })?;

    audit_transition(
        core,
        acting_user_id,
        meta,
        org_id,
        "subscription.manual_revoke",
        Some(&plan_code),
        &plan_code,
        reason,
        HashMap::new(),
    );
    Ok(sub)
}

/// Applies a provider-side snapshot to the local row. Shared by the `sync`
/// operation and the Stripe webhook apply paths; deriving the full target
/// state (rather than incrementing) is what makes redelivery safe.
pub fn apply_provider_snapshot(
    core: &AppCore,
    scope: SubscriptionScope,
    snapshot: &ProviderSubscription,
    plan_code: Option<&str>,
) -> Result<Subscription> {
    let now = chrono::Utc::now().timestamp_millis();
    core.storage.subscriptions.mutate(&scope, |current| {
        let mut sub = current.unwrap_or(Subscription {
            scope,
            state: SubscriptionState::Active,
            plan_code: plan_code.unwrap_or("premium").to_string(),
            stripe_subscription_id: None,
            seats: 1,
            started_at: now,
            renew_at: None,
            cancel_at: None,
            ended_at: None,
            grace_period_ends_at: None,
            trial_ends_at: None,
        });

        sub.stripe_subscription_id = Some(snapshot.id.clone());
        if let Some(code) = plan_code {
            sub.plan_code = code.to_string();
        }
        sub.seats = snapshot.seats;
        sub.renew_at = snapshot.current_period_end_ms;
        sub.cancel_at = if snapshot.cancel_at_period_end {
            snapshot.current_period_end_ms
        } else {
            None
        };

        sub.state = match snapshot.status.as_str() {
            "trialing" => SubscriptionState::Trialing,
            "active" => SubscriptionState::Active,
            "past_due" | "unpaid" => SubscriptionState::PastDue,
            "canceled" | "incomplete_expired" => SubscriptionState::Expired,
            other => {
                tracing::warn!(status = other, "unrecognized provider status, keeping state");
                sub.state
            }
        };
        // For a trialing Stripe subscription the period end is the trial end.
        sub.trial_ends_at = if sub.state == SubscriptionState::Trialing {
            snapshot.current_period_end_ms
        } else {
            None
        };
        if snapshot.cancel_at_period_end
            && matches!(
                sub.state,
                SubscriptionState::Active | SubscriptionState::Trialing
            )
        {
            sub.state = SubscriptionState::Canceled;
        }
        if sub.state == SubscriptionState::Expired {
            sub.ended_at.get_or_insert(now);
        } else {
            sub.ended_at = None;
        }
        if sub.state != SubscriptionState::PastDue {
            sub.grace_period_ends_at = None;
        }
        Ok(sub)
    })
}

/// User-initiated cancel of a Stripe-managed subscription. Access continues
/// until period end: `cancel_at` is set, the state moves to `Canceled`, and
/// the actual expiry arrives later via webhook.
pub async fn cancel(
    core: &AppCore,
    acting_user_id: Uuid,
    meta: &ClientMeta,
    org_id: Uuid,
) -> Result<Subscription> {
    require_admin(core, &org_id, &acting_user_id)?;

    let scope = SubscriptionScope::Organization(org_id);
    let sub = core
        .storage
        .subscriptions
        .get(&scope)?
        .ok_or_else(|| AppError::NotFound("subscription".into()))?;
    let stripe_id = sub
        .stripe_subscription_id
        .clone()
        .ok_or_else(|| AppError::InvalidInput("subscription is not Stripe-managed".into()))?;

    let snapshot = core
        .payments
        .cancel_at_period_end(&stripe_id)
        .await
        .map_err(|e| AppError::Provider(e.to_string()))?;
    let updated = apply_provider_snapshot(core, scope, &snapshot, None)?;

    audit_transition(
        core,
        acting_user_id,
        meta,
        org_id,
        "subscription.cancel",
        Some(&updated.plan_code),
        &updated.plan_code,
        None,
        HashMap::new(),
    );
    Ok(updated)
}

/// Undo a pending cancel. Only valid while the subscription is still live.
pub async fn reactivate(
    core: &AppCore,
    acting_user_id: Uuid,
    meta: &ClientMeta,
    org_id: Uuid,
) -> Result<Subscription> {
    require_admin(core, &org_id, &acting_user_id)?;

    let scope = SubscriptionScope::Organization(org_id);
    let sub = core
        .storage
        .subscriptions
        .get(&scope)?
        .ok_or_else(|| AppError::NotFound("subscription".into()))?;
    if !matches!(
        sub.state,
        SubscriptionState::Active | SubscriptionState::Trialing | SubscriptionState::Canceled
    ) {
        return Err(AppError::InvalidInput(
            "only a live subscription can be reactivated".into(),
        ));
    }
    let stripe_id = sub
        .stripe_subscription_id
        .clone()
        .ok_or_else(|| AppError::InvalidInput("subscription is not Stripe-managed".into()))?;

    let snapshot = core
        .payments
        .reactivate(&stripe_id)
        .await
        .map_err(|e| AppError::Provider(e.to_string()))?;
    let updated = apply_provider_snapshot(core, scope, &snapshot, None)?;

    audit_transition(
        core,
        acting_user_id,
        meta,
        org_id,
        "subscription.reactivate",
        Some(&updated.plan_code),
        &updated.plan_code,
        None,
        HashMap::new(),
    );
    Ok(updated)
}

/// Forwards the target seat count to the provider; proration is entirely the
/// provider's concern. Before/after seat counts go to the audit trail.
pub async fn update_seats(
    core: &AppCore,
    acting_user_id: Uuid,
    meta: &ClientMeta,
    org_id: Uuid,
    seats: u32,
) -> Result<Subscription> {
    require_admin(core, &org_id, &acting_user_id)?;
    if seats == 0 {
        return Err(AppError::InvalidInput("seat count must be positive".into()));
    }

    let scope = SubscriptionScope::Organization(org_id);
    let sub = core
        .storage
        .subscriptions
        .get(&scope)?
        .ok_or_else(|| AppError::NotFound("subscription".into()))?;
    let plan = require_active_plan(core, &sub.plan_code)?;
    if !plan.seat_based {
        return Err(AppError::InvalidInput(format!(
            "plan {} is not seat-based",
            plan.code
        )));
    }
    let stripe_id = sub
        .stripe_subscription_id
        .clone()
        .ok_or_else(|| AppError::InvalidInput("subscription is not Stripe-managed".into()))?;
    let seats_before = sub.seats;

    core.payments
        .update_seats(&stripe_id, seats)
        .await
        .map_err(|e| AppError::Provider(e.to_string()))?;

    let updated = core.storage.subscriptions.mutate::<AppError, _>(&scope, |current| {
        let mut sub = current.ok_or_else(|| AppError::NotFound("subscription".into()))?;
        sub.seats = seats;
        Ok(sub)
    })?;

    let mut extra = HashMap::new();
    extra.insert("seats_before".into(), seats_before.to_string());
    extra.insert("seats_after".into(), seats.to_string());
    audit_transition(
        core,
        acting_user_id,
        meta,
        org_id,
        "subscription.update_seats",
        Some(&updated.plan_code),
        &updated.plan_code,
        None,
        extra,
    );
    Ok(updated)
}

pub async fn create_checkout(
    core: &AppCore,
    acting_user_id: Uuid,
    meta: &ClientMeta,
    org_id: Uuid,
    plan_code: &str,
    seats: u32,
) -> Result<CheckoutSession> {
    require_admin(core, &org_id, &acting_user_id)?;
    require_active_plan(core, plan_code)?;

    let session = core
        .payments
        .create_checkout_session(&org_id.to_string(), plan_code, seats.max(1))
        .await
        .map_err(|e| AppError::Provider(e.to_string()))?;

    let mut details = HashMap::new();
    details.insert("checkout_session".into(), session.id.clone());
    details.insert("plan".into(), plan_code.to_string());
    super::audit::log_custom_activity(
        core,
        acting_user_id,
        Some(org_id),
        "subscription.checkout_created",
        meta,
        details,
    );
    Ok(session)
}

/// Explicit admin-driven reconciliation against the provider. This is the
/// retry path for failed or missed webhook deliveries.
pub async fn sync(core: &AppCore, acting_user_id: Uuid, org_id: Uuid) -> Result<Subscription> {
    require_admin(core, &org_id, &acting_user_id)?;

    let scope = SubscriptionScope::Organization(org_id);
    let sub = core
        .storage
        .subscriptions
        .get(&scope)?
        .ok_or_else(|| AppError::NotFound("subscription".into()))?;
    let stripe_id = sub
        .stripe_subscription_id
        .clone()
        .ok_or_else(|| AppError::InvalidInput("subscription is not Stripe-managed".into()))?;

    let snapshot = core
        .payments
        .fetch_subscription(&stripe_id)
        .await
        .map_err(|e| AppError::Provider(e.to_string()))?;
    apply_provider_snapshot(core, scope, &snapshot, None)
}

/// Plan catalog for checkout UIs. Inactive plans are hidden; existing
/// subscriptions on them keep working.
pub fn list_plans(core: &AppCore) -> Result<Vec<Plan>> {
    let mut plans: Vec<Plan> = core
        .storage
        .plans
        .list()?
        .into_iter()
        .filter(|p| p.is_active)
        .collect();
    plans.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(plans)
}

/// Any member of the organization may read billing info.
pub fn get_billing_info(core: &AppCore, acting_user_id: Uuid, org_id: Uuid) -> Result<BillingInfo> {
    if core.storage.organizations.get(&org_id)?.is_none() {
        return Err(AppError::NotFound("organization".into()));
    }
    if core
        .storage
        .organizations
        .role_of(&org_id, &acting_user_id)?
        .is_none()
    {
        return Err(AppError::Forbidden(
            "caller is not a member of this organization".into(),
        ));
    }

    let sub = core
        .storage
        .subscriptions
        .get(&SubscriptionScope::Organization(org_id))?
        .ok_or_else(|| AppError::NotFound("subscription".into()))?;

    Ok(BillingInfo {
        state: sub.state,
        plan_code: sub.plan_code,
        seats: sub.seats,
        renew_at: sub.renew_at,
        cancel_at: sub.cancel_at,
        grace_period_ends_at: sub.grace_period_ends_at,
        stripe_managed: sub.stripe_subscription_id.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{seed_org_with_admin, test_core};

    fn in_days(days: i64) -> i64 {
        chrono::Utc::now().timestamp_millis() + days * 24 * 60 * 60 * 1_000
    }

    #[test]
    fn manual_grant_reflects_in_billing_info() {
        let (core, _tmp) = test_core();
        let (org, admin) = seed_org_with_admin(&core);
        let ends_at = in_days(30);

        grant_manual(&core, admin, &ClientMeta::default(), org, "team", ends_at, Some("pilot customer")).unwrap();

        let info = get_billing_info(&core, admin, org).unwrap();
        assert_eq!(info.state, SubscriptionState::Active);
        assert_eq!(info.plan_code, "team");
        assert_eq!(info.renew_at, Some(ends_at));
        assert!(!info.stripe_managed);
    }

    #[test]
    fn manual_grant_refuses_stripe_managed_row_without_mutation() {
        let (core, _tmp) = test_core();
        let (org, admin) = seed_org_with_admin(&core);
        let scope = SubscriptionScope::Organization(org);

        // Simulate a checkout having linked Stripe already.
        apply_provider_snapshot(
            &core,
            scope,
            &ProviderSubscription {
                id: "sub_123".into(),
                status: "active".into(),
                current_period_end_ms: Some(in_days(30)),
                cancel_at_period_end: false,
                seats: 3,
            },
            Some("team"),
        )
        .unwrap();

        let err = grant_manual(&core, admin, &ClientMeta::default(), org, "business", in_days(60), None).unwrap_err();
        assert!(matches!(err, AppError::StripeManaged));

        // No mutation happened.
        let sub = core.storage.subscriptions.get(&scope).unwrap().unwrap();
        assert_eq!(sub.plan_code, "team");
        assert_eq!(sub.stripe_subscription_id.as_deref(), Some("sub_123"));
    }

    #[test]
    fn manual_revoke_expires_and_guards() {
        let (core, _tmp) = test_core();
        let (org, admin) = seed_org_with_admin(&core);

        grant_manual(&core, admin, &ClientMeta::default(), org, "team", in_days(30), None).unwrap();
        let sub = revoke_manual(&core, admin, &ClientMeta::default(), org, Some("abuse")).unwrap();
        assert_eq!(sub.state, SubscriptionState::Expired);
        assert!(sub.ended_at.is_some());
    }

    #[test]
    fn non_admin_is_forbidden() {
        let (core, _tmp) = test_core();
        let (org, _admin) = seed_org_with_admin(&core);

        let err = grant_manual(&core, Uuid::new_v4(), &ClientMeta::default(), org, "team", in_days(30), None).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn inactive_plan_is_rejected() {
        let (core, _tmp) = test_core();
        let (org, admin) = seed_org_with_admin(&core);

        let mut plan = core.storage.plans.get_by_code("team").unwrap().unwrap();
        plan.is_active = false;
        core.storage.plans.upsert(&plan).unwrap();

        let err = grant_manual(&core, admin, &ClientMeta::default(), org, "team", in_days(30), None).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn past_ends_at_is_rejected() {
        let (core, _tmp) = test_core();
        let (org, admin) = seed_org_with_admin(&core);

        let err = grant_manual(&core, admin, &ClientMeta::default(), org, "team", in_days(-1), None).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn provider_snapshot_maps_states() {
        let (core, _tmp) = test_core();
        let (org, _) = seed_org_with_admin(&core);
        let scope = SubscriptionScope::Organization(org);

        let sub = apply_provider_snapshot(
            &core,
            scope,
            &ProviderSubscription {
                id: "sub_1".into(),
                status: "past_due".into(),
                current_period_end_ms: Some(in_days(7)),
                cancel_at_period_end: false,
                seats: 2,
            },
            Some("team"),
        )
        .unwrap();
        assert_eq!(sub.state, SubscriptionState::PastDue);

        // Cancel-at-period-end is a pending cancel: access continues.
        let period_end = in_days(20);
        let sub = apply_provider_snapshot(
            &core,
            scope,
            &ProviderSubscription {
                id: "sub_1".into(),
                status: "active".into(),
                current_period_end_ms: Some(period_end),
                cancel_at_period_end: true,
                seats: 2,
            },
            None,
        )
        .unwrap();
        assert_eq!(sub.state, SubscriptionState::Canceled);
        assert_eq!(sub.cancel_at, Some(period_end));

        let sub = apply_provider_snapshot(
            &core,
            scope,
            &ProviderSubscription {
                id: "sub_1".into(),
                status: "canceled".into(),
                current_period_end_ms: None,
                cancel_at_period_end: false,
                seats: 2,
            },
            None,
        )
        .unwrap();
        assert_eq!(sub.state, SubscriptionState::Expired);
        assert!(sub.ended_at.is_some());
    }

    #[test]
    fn plan_catalog_hides_inactive_plans() {
        let (core, _tmp) = test_core();

        let mut plan = core.storage.plans.get_by_code("team").unwrap().unwrap();
        plan.is_active = false;
        core.storage.plans.upsert(&plan).unwrap();

        let plans = list_plans(&core).unwrap();
        assert!(!plans.is_empty());
        assert!(plans.iter().all(|p| p.is_active));
        assert!(!plans.iter().any(|p| p.code == "team"));
    }

    #[test]
    fn trialing_snapshot_sets_trial_end() {
        let (core, _tmp) = test_core();
        let (org, _) = seed_org_with_admin(&core);
        let scope = SubscriptionScope::Organization(org);
        let trial_end = in_days(14);

        let sub = apply_provider_snapshot(
            &core,
            scope,
            &ProviderSubscription {
                id: "sub_trial".into(),
                status: "trialing".into(),
                current_period_end_ms: Some(trial_end),
                cancel_at_period_end: false,
                seats: 1,
            },
            Some("premium"),
        )
        .unwrap();
        assert_eq!(sub.state, SubscriptionState::Trialing);
        assert_eq!(sub.trial_ends_at, Some(trial_end));

        // Converting to a paid period clears the trial end.
        let sub = apply_provider_snapshot(
            &core,
            scope,
            &ProviderSubscription {
                id: "sub_trial".into(),
                status: "active".into(),
                current_period_end_ms: Some(in_days(30)),
                cancel_at_period_end: false,
                seats: 1,
            },
            None,
        )
        .unwrap();
        assert_eq!(sub.state, SubscriptionState::Active);
        assert_eq!(sub.trial_ends_at, None);
    }

    #[test]
    fn pending_cancel_reverts_to_active_when_uncancelled() {
        let (core, _tmp) = test_core();
        let (org, _) = seed_org_with_admin(&core);
        let scope = SubscriptionScope::Organization(org);
        let period_end = in_days(20);

        let snapshot = |pending: bool| ProviderSubscription {
            id: "sub_2".into(),
            status: "active".into(),
            current_period_end_ms: Some(period_end),
            cancel_at_period_end: pending,
            seats: 2,
        };

        let sub = apply_provider_snapshot(&core, scope, &snapshot(true), Some("team")).unwrap();
        assert_eq!(sub.state, SubscriptionState::Canceled);

        // The provider-side uncancel maps straight back.
        let sub = apply_provider_snapshot(&core, scope, &snapshot(false), None).unwrap();
        assert_eq!(sub.state, SubscriptionState::Active);
        assert_eq!(sub.cancel_at, None);
    }

    #[test]
    fn audit_trail_records_transitions() {
        let (core, _tmp) = test_core();
        let (org, admin) = seed_org_with_admin(&core);

        grant_manual(&core, admin, &ClientMeta::default(), org, "team", in_days(30), Some("pilot")).unwrap();
        let entries = core.storage.audit.list_for_org(&org, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].activity_type, "subscription.manual_grant");
        assert_eq!(entries[0].details.get("new_plan").unwrap(), "team");
        assert_eq!(entries[0].details.get("reason").unwrap(), "pilot");
    }
}
