use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// RevenueCat webhook envelope: `{ "api_version": ..., "event": { ... } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct RevenueCatWebhook {
    #[serde(default)]
    pub api_version: Option<String>,
    pub event: RevenueCatEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevenueCatEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: RevenueCatEventType,
    /// Maps to the local user's UUID.
    pub app_user_id: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    /// Epoch millis.
    #[serde(default)]
    pub expiration_at_ms: Option<i64>,
    #[serde(default)]
    pub purchased_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevenueCatEventType {
    InitialPurchase,
    Renewal,
    Cancellation,
    Uncancellation,
    Expiration,
    BillingIssue,
    ProductChange,
    NonRenewingPurchase,
    SubscriberAlias,
    Test,
    #[serde(other)]
    Unknown,
}

impl RevenueCatEventType {
    /// Only this subset mutates subscription state; everything else is
    /// accepted and ignored.
    pub fn requires_subscription_update(&self) -> bool {
        matches!(
            self,
            RevenueCatEventType::InitialPurchase
                | RevenueCatEventType::Renewal
                | RevenueCatEventType::Cancellation
                | RevenueCatEventType::Uncancellation
                | RevenueCatEventType::Expiration
                | RevenueCatEventType::BillingIssue
                | RevenueCatEventType::ProductChange
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy)]
pub struct ProductMapping {
    pub product_id: &'static str,
    pub plan_code: &'static str,
    pub cycle: BillingCycle,
}

/// Static store-product table. An unknown product id is a hard error, never
/// a guess.
const PRODUCT_TABLE: &[ProductMapping] = &[
    ProductMapping {
        product_id: "vaultd_premium_monthly",
        plan_code: "premium",
        cycle: BillingCycle::Monthly,
    },
    ProductMapping {
        product_id: "vaultd_premium_yearly",
        plan_code: "premium",
        cycle: BillingCycle::Yearly,
    },
    ProductMapping {
        product_id: "vaultd_family_monthly",
        plan_code: "family",
        cycle: BillingCycle::Monthly,
    },
    ProductMapping {
        product_id: "vaultd_family_yearly",
        plan_code: "family",
        cycle: BillingCycle::Yearly,
    },
];

pub fn map_product_id(product_id: &str) -> Result<ProductMapping, AppError> {
    PRODUCT_TABLE
        .iter()
        .find(|m| m.product_id == product_id)
        .copied()
        .ok_or_else(|| AppError::UnknownProductId(product_id.to_string()))
}

/// The slice of the Stripe event envelope this backend reads.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_product_maps_to_plan() {
        let m = map_product_id("vaultd_premium_yearly").unwrap();
        assert_eq!(m.plan_code, "premium");
        assert_eq!(m.cycle, BillingCycle::Yearly);
    }

    #[test]
    fn unknown_product_is_rejected() {
        let err = map_product_id("com.someapp.gold").unwrap_err();
        assert!(matches!(err, AppError::UnknownProductId(_)));
    }

    #[test]
    fn test_events_do_not_mutate() {
        assert!(!RevenueCatEventType::Test.requires_subscription_update());
        assert!(!RevenueCatEventType::SubscriberAlias.requires_subscription_update());
        assert!(RevenueCatEventType::Renewal.requires_subscription_update());
    }

    #[test]
    fn unknown_event_type_parses() {
        let json = r#"{"id":"ev1","type":"SOME_FUTURE_TYPE","app_user_id":"u1"}"#;
        let event: RevenueCatEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, RevenueCatEventType::Unknown);
        assert!(!event.event_type.requires_subscription_update());
    }
}
