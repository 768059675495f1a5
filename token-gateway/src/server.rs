//! HTTP server bootstrap for the gateway binary.

use crate::exchange::TokenGateway;
use crate::routes::router;
use core_runtime::error::{Error, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const ENV_BIND_ADDR: &str = "GATEWAY_BIND_ADDR";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Reads the listen address from `GATEWAY_BIND_ADDR`.
pub fn bind_addr_from_env() -> Result<SocketAddr> {
    bind_addr_from_lookup(|name| std::env::var(name).ok())
}

/// Same as [`bind_addr_from_env`] with an arbitrary variable lookup.
pub fn bind_addr_from_lookup<F>(lookup: F) -> Result<SocketAddr>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(ENV_BIND_ADDR)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", ENV_BIND_ADDR, raw, e)))
}

/// Serves the token route on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    gateway: Arc<TokenGateway>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let missing = gateway.config().missing_settings();
    if !missing.is_empty() {
        warn!(
            missing = ?missing,
            "Client settings incomplete, token exchanges will fail"
        );
    }

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Token gateway listening");
    }

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
