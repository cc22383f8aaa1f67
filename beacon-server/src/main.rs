use anyhow::Context;
use beacon_server::{ServerConfig, SessionRegistry, SignalingRelay, router};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();

    let registry = SessionRegistry::new(config.dev_mode);
    let relay = SignalingRelay::new(registry, config.ice_config());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    info!(addr = %config.bind, dev_mode = config.dev_mode, "Signaling relay listening");

    axum::serve(listener, router(relay))
        .await
        .context("Server error")?;

    Ok(())
}
