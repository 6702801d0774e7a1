//! Session records and related value types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// A stored refresh-token session.
///
/// `id`, `user_identifier`, `refresh_token`, `created_at`, and `expires_at`
/// never change after creation. `is_revoked` only ever goes from `false` to
/// `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Caller-supplied unique identifier.
    pub id: String,
    /// Owner of the session (typically an email address).
    pub user_identifier: String,
    /// Opaque refresh token; the blacklist key on revoke/delete.
    pub refresh_token: String,
    /// Whether the session has been revoked.
    #[serde(default)]
    pub is_revoked: bool,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Encode for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| SessionError::Encode {
            id: self.id.clone(),
            source,
        })
    }

    /// Decode a stored record. `id` is only used to label the error.
    pub fn from_bytes(id: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| SessionError::Corruption {
            id: id.to_string(),
            source,
        })
    }

    /// Whether the session has passed its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Input for creating a session.
///
/// `created_at` defaults to the time of the write. `expires_at` may be left
/// unset when going through the lifecycle manager, which fills it from the
/// configured session TTL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewSession {
    pub id: String,
    pub user_identifier: String,
    pub refresh_token: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewSession {
    /// Create an input with the three required identifiers.
    pub fn new(
        id: impl Into<String>,
        user_identifier: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_identifier: user_identifier.into(),
            refresh_token: refresh_token.into(),
            created_at: None,
            expires_at: None,
        }
    }

    /// Set an explicit expiry.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set an explicit creation time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Check that the required identifiers are present.
    pub fn validate_fields(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(SessionError::validation("session id is required"));
        }
        if self.user_identifier.is_empty() {
            return Err(SessionError::validation("user identifier is required"));
        }
        if self.refresh_token.is_empty() {
            return Err(SessionError::validation("refresh token is required"));
        }
        Ok(())
    }

    /// Build the stored record, filling `created_at` with `now` if unset.
    ///
    /// Fails if a field is missing or `expires_at` is unset or not strictly
    /// after `now`.
    pub fn into_session(self, now: DateTime<Utc>) -> Result<Session> {
        self.validate_fields()?;
        let expires_at = self
            .expires_at
            .ok_or_else(|| SessionError::validation("expiration time is required"))?;
        if expires_at <= now {
            return Err(SessionError::validation(
                "session expiration time must be in the future",
            ));
        }

        Ok(Session {
            id: self.id,
            user_identifier: self.user_identifier,
            refresh_token: self.refresh_token,
            is_revoked: false,
            created_at: self.created_at.unwrap_or(now),
            expires_at,
        })
    }
}

/// Why a refresh token was blacklisted. Stored as the marker value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlacklistReason {
    Revoked,
    Deleted,
}

impl BlacklistReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revoked => "revoked",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for BlacklistReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlacklistReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "revoked" => Ok(Self::Revoked),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown blacklist reason: {other}")),
        }
    }
}
