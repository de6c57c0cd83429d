//! slrelay - WebSocket group relay.
//!
//! Clients connect, receive an opaque session id, and form ad hoc groups by
//! joining each other's sessions. Text published by a session is relayed to
//! every peer in its group.

mod config;
mod error;
mod handlers;
mod http;
mod metrics;
mod network;
mod state;

use crate::config::Config;
use crate::network::Gateway;
use crate::state::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        path = %config.listen.path,
        tls = config.tls.is_some(),
        "Starting slrelay"
    );

    let registry = Arc::new(Registry::new());

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    let gateway = Gateway::bind(config.listen, config.tls, Arc::clone(&registry)).await?;

    tokio::select! {
        result = gateway.run() => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            let closing = registry.close_all();
            info!(sessions = closing, "Shutting down");
            drain(&registry).await;
            Ok(())
        }
    }
}

/// Give connection workers a moment to send their close frames.
async fn drain(registry: &Registry) {
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while !registry.is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if !registry.is_empty() {
        warn!(remaining = registry.len(), "Sessions still open at shutdown");
    }
}
