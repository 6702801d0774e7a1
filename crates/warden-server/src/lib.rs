//! HTTP API and health probe server for Warden.
//!
//! This crate exposes the session lifecycle manager over JSON/HTTP and runs
//! a separate health probe listener next to it.
//!
//! # Example
//!
//! ```ignore
//! use warden_server::{Server, ServerConfig};
//!
//! let server = Server::new(sessions, ServerConfig::default(), shutdown.clone());
//! server.run().await?;
//! ```

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use routes::{CreateSessionRequest, HealthCheck, HealthRegistry, HealthReport, HealthStatus};
pub use state::AppState;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use warden_session::SessionManager;

use routes::{BackendCheck, HealthState};

/// The Warden API and health probe server.
pub struct Server {
    /// Application state.
    state: AppState,
    /// Health probe state.
    health: HealthState,
}

impl Server {
    /// Create a server with the default health checks (backend ping).
    ///
    /// Cancelling `shutdown` stops both listeners. In-flight requests keep
    /// running until they finish or the configured drain timeout passes.
    pub fn new(
        sessions: SessionManager,
        config: ServerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = HealthRegistry::new(config.service_name.clone(), config.health_timeout)
            .with_check(BackendCheck::new(sessions.clone()));
        let health = HealthState {
            registry: Arc::new(registry),
            shutdown: shutdown.clone(),
        };

        Self {
            state: AppState::new(sessions, config, shutdown),
            health,
        }
    }

    /// Replace the health registry.
    pub fn with_health_registry(mut self, registry: HealthRegistry) -> Self {
        self.health.registry = Arc::new(registry);
        self
    }

    /// Build the API router.
    pub fn router(&self) -> Router {
        Router::new()
            .nest("/api/v1", Self::api_routes())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Build the health probe router.
    pub fn health_router(&self) -> Router {
        routes::health_routes(self.health.clone())
    }

    /// API routes (v1).
    fn api_routes() -> Router<AppState> {
        use axum::routing::{get, post};

        Router::new()
            .route("/sessions", post(routes::create_session_handler))
            .route(
                "/sessions/{id}",
                get(routes::get_session_handler).delete(routes::delete_session_handler),
            )
            .route(
                "/sessions/{id}/revoke",
                post(routes::revoke_session_handler),
            )
            .route(
                "/users/{user_identifier}/sessions",
                get(routes::list_user_sessions_handler),
            )
            .route("/blacklist/{token}", get(routes::blacklist_handler))
    }

    /// Bind both configured addresses and serve until shutdown.
    pub async fn run(self) -> Result<()> {
        let api = bind(self.state.config.bind_address).await?;
        let health = bind(self.state.config.health_address).await?;
        self.serve(api, health).await
    }

    /// Serve on pre-bound listeners until the shutdown token is cancelled.
    ///
    /// If either listener fails the other is shut down too. Once shutdown
    /// begins, requests still in flight get `drain_timeout` to complete
    /// before their backend calls are cancelled.
    pub async fn serve(self, api: TcpListener, health: TcpListener) -> Result<()> {
        let shutdown = self.state.shutdown.clone();
        let abort = self.state.abort.clone();
        tokio::spawn(drain_deadline(
            shutdown.clone(),
            abort.clone(),
            self.state.config.drain_timeout,
        ));

        info!(
            api = %local_addr(&api),
            health = %local_addr(&health),
            backend = self.state.sessions.backend_name(),
            "Starting server"
        );

        let api_server = axum::serve(api, self.router()).with_graceful_shutdown({
            let token = shutdown.clone();
            async move { token.cancelled().await }
        });
        let health_server = axum::serve(health, self.health_router()).with_graceful_shutdown({
            let token = shutdown.clone();
            async move { token.cancelled().await }
        });

        let (api_result, health_result) = tokio::join!(
            async {
                let result = api_server.await;
                shutdown.cancel();
                result
            },
            async {
                let result = health_server.await;
                shutdown.cancel();
                result
            },
        );
        abort.cancel();

        api_result.map_err(|e| ServerError::Internal(format!("API server error: {e}")))?;
        health_result.map_err(|e| ServerError::Internal(format!("Health server error: {e}")))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Cancel `abort` once `drain` has elapsed after `shutdown`.
///
/// Returns early if `abort` is cancelled first (both listeners drained).
async fn drain_deadline(
    shutdown: CancellationToken,
    abort: CancellationToken,
    drain: Duration,
) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = abort.cancelled() => return,
    }

    tokio::select! {
        _ = tokio::time::sleep(drain) => {
            warn!(
                drain_ms = drain.as_millis() as u64,
                "Drain timeout reached, cancelling in-flight requests"
            );
            abort.cancel();
        }
        _ = abort.cancelled() => {}
    }
}

async fn bind(addr: std::net::SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to bind {addr}: {e}")))
}

fn local_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
