//! Serve command - runs the session API and health probe.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_config::WardenConfig;
use warden_server::{Server, ServerConfig};
use warden_session::{MemoryBackend, SessionManager, SharedBackend};

use super::Context;
use crate::logging;

pub async fn run(ctx: &Context) -> Result<()> {
    let loaded = warden_config::load_config(ctx.config_path.as_deref())
        .context("failed to load configuration")?;
    let config = loaded.config;

    let _guard = logging::init(&config.logging, ctx.verbose, ctx.json_logs);

    info!(
        env = %config.service.env,
        source = loaded
            .source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string()),
        "Configuration loaded"
    );

    let backend = connect_backend(&config, ctx.memory).await?;
    let sessions = SessionManager::new(backend, config.session_policy());
    let server_config = ServerConfig::from_config(&config)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    info!(
        api = %server_config.bind_address,
        health = %server_config.health_address,
        session_ttl_days = config.service.session_ttl_days,
        "Warden starting"
    );

    Server::new(sessions, server_config, shutdown).run().await?;
    Ok(())
}

async fn connect_backend(config: &WardenConfig, memory: bool) -> Result<SharedBackend> {
    if memory {
        warn!("Using in-process backend; sessions will not survive a restart");
        return Ok(Arc::new(MemoryBackend::new()));
    }

    connect_redis(config).await
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &WardenConfig) -> Result<SharedBackend> {
    let backend = warden_session::RedisBackend::connect(&config.redis.connection_url())
        .await
        .context("failed to connect to Redis")?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_config: &WardenConfig) -> Result<SharedBackend> {
    anyhow::bail!("built without Redis support; run with --memory")
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => return,
    }

    info!("Shutdown signal received, draining connections");
    shutdown.cancel();
}
