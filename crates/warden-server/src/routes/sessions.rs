//! Session lifecycle endpoints.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_session::{BlacklistReason, NewSession, Session};

use crate::error::Result;
use crate::state::AppState;

/// Request to issue a session.
///
/// Missing identifiers deserialize as empty strings and are rejected by
/// validation, so the client gets a uniform 400.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_identifier: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Defaults to now plus the configured session TTL.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<CreateSessionRequest> for NewSession {
    fn from(req: CreateSessionRequest) -> Self {
        NewSession {
            id: req.id,
            user_identifier: req.user_identifier,
            refresh_token: req.refresh_token,
            created_at: None,
            expires_at: req.expires_at,
        }
    }
}

/// Response for listing a user's sessions.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<Session>,
    pub total: usize,
}

/// Response for a blacklist lookup.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlacklistResponse {
    pub blacklisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BlacklistReason>,
}

/// POST /api/v1/sessions
pub async fn create_session_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Session>)> {
    let Json(req) = payload?;
    let cancel = state.request_token();

    let session = state.sessions.create(req.into(), &cancel).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>> {
    let cancel = state.request_token();
    Ok(Json(state.sessions.get(&id, &cancel).await?))
}

/// POST /api/v1/sessions/{id}/revoke
pub async fn revoke_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>> {
    let cancel = state.request_token();
    Ok(Json(state.sessions.revoke(&id, &cancel).await?))
}

/// DELETE /api/v1/sessions/{id}
pub async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>> {
    let cancel = state.request_token();
    Ok(Json(state.sessions.delete(&id, &cancel).await?))
}

/// GET /api/v1/users/{user_identifier}/sessions
pub async fn list_user_sessions_handler(
    State(state): State<AppState>,
    Path(user_identifier): Path<String>,
) -> Result<Json<ListSessionsResponse>> {
    let cancel = state.request_token();
    let sessions = state
        .sessions
        .list_by_user(&user_identifier, &cancel)
        .await?;

    debug!(user = %user_identifier, count = sessions.len(), "Listed user sessions");
    Ok(Json(ListSessionsResponse {
        total: sessions.len(),
        sessions,
    }))
}

/// GET /api/v1/blacklist/{token}
pub async fn blacklist_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<BlacklistResponse>> {
    let cancel = state.request_token();
    let blacklisted = state.sessions.is_blacklisted(&token, &cancel).await?;
    let reason = if blacklisted {
        state.sessions.blacklist_reason(&token, &cancel).await?
    } else {
        None
    };

    Ok(Json(BlacklistResponse {
        blacklisted,
        reason,
    }))
}
