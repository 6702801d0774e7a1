//! API routes.

pub mod health;
pub mod sessions;

pub use health::{
    BackendCheck, CheckResult, HealthCheck, HealthRegistry, HealthReport, HealthState,
    HealthStatus, InfoResponse, health_routes,
};
pub use sessions::{
    BlacklistResponse, CreateSessionRequest, ListSessionsResponse, blacklist_handler,
    create_session_handler, delete_session_handler, get_session_handler,
    list_user_sessions_handler, revoke_session_handler,
};
