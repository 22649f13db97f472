pub mod api;
pub mod config;
pub mod error;
pub mod mailer;
pub mod models;
pub mod payments;
pub mod services;
pub mod storage;

use config::AppConfig;
use mailer::{HttpMailer, Mailer, NoopMailer};
use payments::{PaymentProvider, StripeClient, UnconfiguredProvider};
use services::bulk_email::JobRegistry;
use std::sync::Arc;
use storage::Storage;

/// Core application state shared by every API handler and worker.
pub struct AppCore {
    pub config: AppConfig,
    pub storage: Arc<Storage>,
    pub payments: Arc<dyn PaymentProvider>,
    pub mailer: Arc<dyn Mailer>,
    pub bulk_jobs: Arc<JobRegistry>,
}

impl AppCore {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let storage = Arc::new(Storage::new(&config.db_path, &config.at_rest_passphrase)?);

        let payments: Arc<dyn PaymentProvider> = match &config.stripe_secret_key {
            Some(key) => Arc::new(StripeClient::new(key.clone())?),
            None => {
                tracing::warn!("no Stripe secret key configured; provider calls will fail");
                Arc::new(UnconfiguredProvider)
            }
        };

        let mailer: Arc<dyn Mailer> = match (&config.mail_endpoint, &config.mail_api_key) {
            (Some(endpoint), Some(key)) => {
                Arc::new(HttpMailer::new(endpoint.clone(), key.clone())?)
            }
            _ => Arc::new(NoopMailer),
        };

        Ok(Self {
            config,
            storage,
            payments,
            mailer,
            bulk_jobs: Arc::new(JobRegistry::new()),
        })
    }
}
