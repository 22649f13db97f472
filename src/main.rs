use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vaultd::api::{self, AppState};
use vaultd::config::AppConfig;
use vaultd::AppCore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    let addr = config.socket_addr()?;
    let core = Arc::new(AppCore::new(config)?);

    let app = api::router(AppState::new(core));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "vaultd listening");

    axum::serve(listener, app).await?;
    Ok(())
}
