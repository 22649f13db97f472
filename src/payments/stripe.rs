//! Thin Stripe REST client: form-encoded requests, bounded timeouts, no SDK.

use super::{CheckoutSession, PaymentProvider, ProviderSubscription};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const API_BASE: &str = "https://api.stripe.com/v1";

pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build stripe http client")?;
        Ok(Self { client, secret_key })
    }

    async fn post_form(&self, path: &str, form: &[(String, String)]) -> Result<Value> {
        let response = self
            .client
            .post(format!("{API_BASE}{path}"))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .with_context(|| format!("stripe request to {path} failed"))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("stripe response from {path} was not json"))?;
        if !status.is_success() {
            let detail = body["error"]["message"].as_str().unwrap_or("unknown error");
            anyhow::bail!("stripe returned {status}: {detail}");
        }
        Ok(body)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{API_BASE}{path}"))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .with_context(|| format!("stripe request to {path} failed"))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("stripe response from {path} was not json"))?;
        if !status.is_success() {
            let detail = body["error"]["message"].as_str().unwrap_or("unknown error");
            anyhow::bail!("stripe returned {status}: {detail}");
        }
        Ok(body)
    }

}

/// Map a raw Stripe subscription object (API response or webhook payload)
/// into the provider-agnostic snapshot.
pub fn parse_subscription_object(object: &Value) -> Result<ProviderSubscription> {
    let id = object["id"]
        .as_str()
        .context("stripe subscription missing id")?
        .to_string();
    let status = object["status"]
        .as_str()
        .context("stripe subscription missing status")?
        .to_string();
    // Stripe reports epoch seconds.
    let current_period_end_ms = object["current_period_end"].as_i64().map(|s| s * 1_000);
    let cancel_at_period_end = object["cancel_at_period_end"].as_bool().unwrap_or(false);
    let seats = object["quantity"].as_u64().unwrap_or(1) as u32;
    Ok(ProviderSubscription {
        id,
        status,
        current_period_end_ms,
        cancel_at_period_end,
        seats,
    })
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        customer_ref: &str,
        plan_code: &str,
        seats: u32,
    ) -> Result<CheckoutSession> {
        let form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("client_reference_id".to_string(), customer_ref.to_string()),
            ("line_items[0][price]".to_string(), plan_code.to_string()),
            ("line_items[0][quantity]".to_string(), seats.to_string()),
        ];
        let body = self.post_form("/checkout/sessions", &form).await?;
        Ok(CheckoutSession {
            id: body["id"]
                .as_str()
                .context("checkout session missing id")?
                .to_string(),
            url: body["url"]
                .as_str()
                .context("checkout session missing url")?
                .to_string(),
        })
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription> {
        let body = self.get(&format!("/subscriptions/{subscription_id}")).await?;
        parse_subscription_object(&body)
    }

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<ProviderSubscription> {
        let form = vec![("cancel_at_period_end".to_string(), "true".to_string())];
        let body = self
            .post_form(&format!("/subscriptions/{subscription_id}"), &form)
            .await?;
        parse_subscription_object(&body)
    }

    async fn reactivate(&self, subscription_id: &str) -> Result<ProviderSubscription> {
        let form = vec![("cancel_at_period_end".to_string(), "false".to_string())];
        let body = self
            .post_form(&format!("/subscriptions/{subscription_id}"), &form)
            .await?;
        parse_subscription_object(&body)
    }

    async fn update_seats(&self, subscription_id: &str, seats: u32) -> Result<()> {
        let form = vec![("quantity".to_string(), seats.to_string())];
        self.post_form(&format!("/subscriptions/{subscription_id}"), &form)
            .await?;
        Ok(())
    }
}
