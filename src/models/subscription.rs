use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Trialing,
    Active,
    /// Payment failed; access continues until `grace_period_ends_at`.
    PastDue,
    /// Cancel-at-period-end is pending. Access continues until period end.
    Canceled,
    Expired,
}

/// What a subscription is attached to: a whole organization, or a single
/// user on a personal plan (the RevenueCat path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SubscriptionScope {
    Organization(Uuid),
    User(Uuid),
}

impl SubscriptionScope {
    /// Stable storage key, e.g. `org:<uuid>` / `user:<uuid>`.
    pub fn storage_key(&self) -> String {
        match self {
            SubscriptionScope::Organization(id) => format!("org:{id}"),
            SubscriptionScope::User(id) => format!("user:{id}"),
        }
    }
}

/// One subscription per scope.
///
/// `stripe_subscription_id = None` is the sentinel for a manually managed
/// subscription. `renew_at` is the next renewal date for Stripe-managed rows
/// but the hard expiry date for manual grants; the overload is kept for
/// storage compatibility with existing rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub scope: SubscriptionScope,
    pub state: SubscriptionState,
    pub plan_code: String,
    pub stripe_subscription_id: Option<String>,
    pub seats: u32,
    pub started_at: i64,
    pub renew_at: Option<i64>,
    pub cancel_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub grace_period_ends_at: Option<i64>,
    pub trial_ends_at: Option<i64>,
}

impl Subscription {
    pub fn is_stripe_managed(&self) -> bool {
        self.stripe_subscription_id.is_some()
    }
}

/// Reference data. Immutable from the engine's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Stable identifier shared across providers.
    pub code: String,
    pub name: String,
    pub is_active: bool,
    /// Seat counts only make sense on team/business plans.
    pub seat_based: bool,
}
