use anyhow::Context;
use core_runtime::config::SpotifyConfig;
use core_runtime::logging::{init_logging, LoggingConfig};
use std::sync::Arc;
use token_gateway::server::{bind_addr_from_env, serve, shutdown_signal};
use token_gateway::TokenGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::from_env()?)?;

    let config = SpotifyConfig::from_env().context("Failed to load Spotify configuration")?;
    let gateway = Arc::new(TokenGateway::from_config(config)?);

    let addr = bind_addr_from_env()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    serve(listener, gateway, shutdown_signal()).await?;

    Ok(())
}
