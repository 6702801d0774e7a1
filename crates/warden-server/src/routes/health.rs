//! Health probe endpoints.
//!
//! Served on their own listener so orchestrators can probe the process
//! without going through the API port:
//! - `/health` runs every registered check and answers 503 if any is down
//! - `/live` answers `ALIVE` as long as the process is serving
//! - `/info` describes the service

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use warden_session::SessionManager;

/// Outcome of a check, or of the whole report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Result of a single check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl CheckResult {
    pub fn up(duration: Duration) -> Self {
        Self {
            status: HealthStatus::Up,
            error: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn down(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: HealthStatus::Down,
            error: Some(error.into()),
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// A dependency the service needs in order to be useful.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Key under which the result is reported.
    fn name(&self) -> &str;

    /// Probe the dependency.
    async fn check(&self, cancel: &CancellationToken) -> CheckResult;
}

/// Pings the session backend.
pub struct BackendCheck {
    sessions: SessionManager,
}

impl BackendCheck {
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl HealthCheck for BackendCheck {
    fn name(&self) -> &str {
        "backend"
    }

    async fn check(&self, cancel: &CancellationToken) -> CheckResult {
        let start = Instant::now();
        match self.sessions.ping(cancel).await {
            Ok(()) => CheckResult::up(start.elapsed()),
            Err(e) => CheckResult::down(e.to_string(), start.elapsed()),
        }
    }
}

/// Full `/health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, CheckResult>,
}

/// Registered checks plus the metadata the probe reports.
pub struct HealthRegistry {
    service: String,
    version: String,
    timeout: Duration,
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthRegistry {
    /// Create an empty registry. Each check is bounded by `timeout`.
    pub fn new(service: impl Into<String>, timeout: Duration) -> Self {
        Self {
            service: service.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timeout,
            checks: Vec::new(),
        }
    }

    /// Register a check.
    pub fn with_check(mut self, check: impl HealthCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Run every check, each bounded by the registry timeout.
    pub async fn run(&self, cancel: &CancellationToken) -> HealthReport {
        let mut checks = BTreeMap::new();

        for check in &self.checks {
            let start = Instant::now();
            let result = match tokio::time::timeout(self.timeout, check.check(cancel)).await {
                Ok(result) => result,
                Err(_) => CheckResult::down(
                    format!("timed out after {:?}", self.timeout),
                    start.elapsed(),
                ),
            };
            if result.status == HealthStatus::Down {
                warn!(
                    check = check.name(),
                    error = result.error.as_deref().unwrap_or_default(),
                    "Health check failed"
                );
            }
            checks.insert(check.name().to_string(), result);
        }

        let status = if checks.values().all(|c| c.status == HealthStatus::Up) {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };

        HealthReport {
            status,
            service: self.service.clone(),
            version: self.version.clone(),
            timestamp: Utc::now(),
            checks,
        }
    }
}

/// State for the health router.
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<HealthRegistry>,
    pub shutdown: CancellationToken,
}

/// GET /health
pub async fn health_handler(State(state): State<HealthState>) -> Response {
    let report = state.registry.run(&state.shutdown.child_token()).await;
    let status = match report.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report)).into_response()
}

/// GET /live
pub async fn live_handler() -> &'static str {
    "ALIVE"
}

/// `/info` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub service: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
}

/// GET /info
pub async fn info_handler(State(state): State<HealthState>) -> Json<InfoResponse> {
    let endpoints = ["health", "live", "info"]
        .into_iter()
        .map(|name| (name.to_string(), format!("/{name}")))
        .collect();

    Json(InfoResponse {
        service: state.registry.service().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
    })
}

/// Create health probe routes.
pub fn health_routes(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/live", get(live_handler))
        .route("/info", get(info_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;
    use warden_session::{BackendOp, MemoryBackend, SessionPolicy};

    struct Stalled;

    #[async_trait]
    impl HealthCheck for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn check(&self, _cancel: &CancellationToken) -> CheckResult {
            std::future::pending().await
        }
    }

    fn app(memory: Arc<MemoryBackend>) -> Router {
        let sessions = SessionManager::new(memory, SessionPolicy::default());
        let registry = HealthRegistry::new("warden-test", Duration::from_secs(1))
            .with_check(BackendCheck::new(sessions));
        health_routes(HealthState {
            registry: Arc::new(registry),
            shutdown: CancellationToken::new(),
        })
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_health_up() {
        let (status, body) = get_body(app(Arc::new(MemoryBackend::new())), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let report: HealthReport = serde_json::from_slice(&body).unwrap();
        assert_eq!(report.status, HealthStatus::Up);
        assert_eq!(report.service, "warden-test");
        assert_eq!(report.checks["backend"].status, HealthStatus::Up);
    }

    #[tokio::test]
    async fn test_health_down_when_backend_fails() {
        let memory = Arc::new(MemoryBackend::new());
        memory.fail_next(BackendOp::Ping, 1);

        let (status, body) = get_body(app(memory), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let report: HealthReport = serde_json::from_slice(&body).unwrap();
        assert_eq!(report.status, HealthStatus::Down);
        assert!(report.checks["backend"].error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_check_times_out() {
        let registry =
            HealthRegistry::new("warden-test", Duration::from_millis(100)).with_check(Stalled);

        let report = registry.run(&CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Down);
        assert!(
            report.checks["stalled"]
                .error
                .as_deref()
                .unwrap()
                .contains("timed out")
        );
    }

    #[tokio::test]
    async fn test_live_and_info() {
        let memory = Arc::new(MemoryBackend::new());

        let (status, body) = get_body(app(memory.clone()), "/live").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ALIVE");

        let (status, body) = get_body(app(memory), "/info").await;
        assert_eq!(status, StatusCode::OK);
        let info: InfoResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.service, "warden-test");
        assert_eq!(info.endpoints["health"], "/health");
    }
}
