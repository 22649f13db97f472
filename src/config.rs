use std::net::SocketAddr;

/// Runtime configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: String,
    /// Passphrase for at-rest sealing of sensitive structured fields.
    pub at_rest_passphrase: String,
    /// Stripe webhook signing secret (`whsec_...`).
    pub stripe_webhook_secret: String,
    pub stripe_secret_key: Option<String>,
    /// RevenueCat shared secret, compared verbatim against `Authorization`.
    pub revenuecat_secret: String,
    pub mail_endpoint: Option<String>,
    pub mail_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            db_path: "vaultd.redb".to_string(),
            at_rest_passphrase: String::new(),
            stripe_webhook_secret: String::new(),
            stripe_secret_key: None,
            revenuecat_secret: String::new(),
            mail_endpoint: None,
            mail_api_key: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("VAULTD_BIND").unwrap_or(defaults.bind_addr),
            db_path: std::env::var("VAULTD_DB_PATH").unwrap_or(defaults.db_path),
            at_rest_passphrase: std::env::var("VAULTD_AT_REST_PASSPHRASE").unwrap_or_default(),
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            stripe_secret_key: std::env::var("STRIPE_SECRET_KEY").ok(),
            revenuecat_secret: std::env::var("REVENUECAT_WEBHOOK_SECRET").unwrap_or_default(),
            mail_endpoint: std::env::var("VAULTD_MAIL_ENDPOINT").ok(),
            mail_api_key: std::env::var("VAULTD_MAIL_API_KEY").ok(),
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address {}: {e}", self.bind_addr))
    }
}
