//! Payment provider port. The subscription state machine consumes this
//! collaborator's side effects; it never implements them.

pub mod stripe;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use stripe::StripeClient;

/// Provider-side view of a subscription, as returned by fetch/cancel/
/// reactivate calls. `status` is the provider's own vocabulary
/// (`active`, `past_due`, ...) and is mapped by the billing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: String,
    pub current_period_end_ms: Option<i64>,
    pub cancel_at_period_end: bool,
    pub seats: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Placeholder wired when no Stripe key is configured; every call fails
/// with a clear message instead of panicking at startup.
pub struct UnconfiguredProvider;

#[async_trait]
impl PaymentProvider for UnconfiguredProvider {
    async fn create_checkout_session(
        &self,
        _customer_ref: &str,
        _plan_code: &str,
        _seats: u32,
    ) -> Result<CheckoutSession> {
        anyhow::bail!("payment provider is not configured")
    }

    async fn fetch_subscription(&self, _subscription_id: &str) -> Result<ProviderSubscription> {
        anyhow::bail!("payment provider is not configured")
    }

    async fn cancel_at_period_end(&self, _subscription_id: &str) -> Result<ProviderSubscription> {
        anyhow::bail!("payment provider is not configured")
    }

    async fn reactivate(&self, _subscription_id: &str) -> Result<ProviderSubscription> {
        anyhow::bail!("payment provider is not configured")
    }

    async fn update_seats(&self, _subscription_id: &str, _seats: u32) -> Result<()> {
        anyhow::bail!("payment provider is not configured")
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        customer_ref: &str,
        plan_code: &str,
        seats: u32,
    ) -> Result<CheckoutSession>;

    async fn fetch_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription>;

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<ProviderSubscription>;

    async fn reactivate(&self, subscription_id: &str) -> Result<ProviderSubscription>;

    /// Proration is entirely the provider's concern; this only forwards the
    /// target seat count.
    async fn update_seats(&self, subscription_id: &str, seats: u32) -> Result<()>;
}
