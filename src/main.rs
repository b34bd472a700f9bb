use std::sync::Arc;

use anyhow::Context;
use tarantoolctl::config::ControlPlaneConfig;
use tarantoolctl::ip_pool::{IpPool, StaticIpPool};
use tarantoolctl::AppState;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Phase 1: basic tracing so config-load failures are still logged.
    let _basic_tracing = init_tracing_basic();

    info!("starting tarantoolctl control plane v{}", env!("CARGO_PKG_VERSION"));

    let config = ControlPlaneConfig::load().context("failed to load configuration")?;
    config.validate().context("configuration validation failed")?;

    // Phase 2: replace the thread-local subscriber with the configured one.
    drop(_basic_tracing);
    init_tracing_from_config(&config);

    info!("configuration loaded, coordination store at {}", config.consul.base_url);

    let ip_pool: Arc<dyn IpPool> = Arc::new(StaticIpPool::new(
        config
            .ip_pool
            .addresses
            .iter()
            .filter_map(|a| a.parse().ok())
            .collect(),
    ));

    let state = AppState::new(config, ip_pool).context("failed to build application state")?;

    state.initialize().await.context("failed to perform initial snapshot refresh")?;

    info!("sensor refresh and kv-watch background loops started");

    shutdown_signal().await;
    warn!("shutdown signal received, stopping background loops");
    state.shutdown();

    Ok(())
}

fn init_tracing_basic() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_target(true).finish();
    tracing::subscriber::set_default(subscriber)
}

fn init_tracing_from_config(config: &ControlPlaneConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    use tarantoolctl::config::{LogFormat, LogOutput};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    match (config.logging.format, config.logging.output) {
        (LogFormat::Json, LogOutput::Stdout) => {
            let layer = fmt::layer().json().with_target(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        (LogFormat::Pretty, LogOutput::Stdout) => {
            let layer = fmt::layer().with_target(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

/// Idles until Ctrl+C or SIGTERM, the same graceful-shutdown wait used by
/// `crates/cluster/src/main.rs::shutdown_signal`.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
