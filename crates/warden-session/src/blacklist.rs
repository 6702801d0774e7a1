//! Ledger of refresh tokens that must no longer be honored.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::BoundedBackend;
use crate::config::KeyLayout;
use crate::error::{Result, SessionError};
use crate::ttl;
use crate::types::BlacklistReason;

/// Token blacklist.
///
/// Each entry is a marker key holding the reason tag. Entries expire with
/// the token they block; a token whose session already ran out is still
/// blocked for `min_ttl`.
#[derive(Clone)]
pub struct BlacklistLedger {
    backend: BoundedBackend,
    keys: KeyLayout,
    min_ttl: Duration,
}

impl BlacklistLedger {
    pub fn new(backend: BoundedBackend, keys: KeyLayout, min_ttl: Duration) -> Self {
        Self {
            backend,
            keys,
            min_ttl,
        }
    }

    /// The TTL floor applied to expired or zero-length entries.
    pub fn min_ttl(&self) -> Duration {
        self.min_ttl
    }

    /// Blacklist `token` for `ttl`, or for the floor when `ttl` is absent or zero.
    ///
    /// Returns the TTL actually written.
    pub async fn mark(
        &self,
        token: &str,
        reason: BlacklistReason,
        ttl: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Duration> {
        require_token(token)?;
        let ttl = ttl::at_least(ttl, self.min_ttl);

        self.backend
            .set(
                cancel,
                &self.keys.blacklist(token),
                reason.as_str().as_bytes(),
                ttl,
            )
            .await?;

        debug!(%reason, ttl_ms = ttl.as_millis() as u64, "Refresh token blacklisted");
        Ok(ttl)
    }

    /// Whether `token` is blacklisted.
    pub async fn is_marked(&self, token: &str, cancel: &CancellationToken) -> Result<bool> {
        require_token(token)?;
        Ok(self
            .backend
            .exists(cancel, &self.keys.blacklist(token))
            .await?)
    }

    /// The recorded reason for a blacklisted token, if any.
    ///
    /// Unknown tags (written by another deployment) read as `None`.
    pub async fn reason(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<BlacklistReason>> {
        require_token(token)?;
        let value = self
            .backend
            .get(cancel, &self.keys.blacklist(token))
            .await?;
        Ok(value.and_then(|bytes| std::str::from_utf8(&bytes).ok()?.parse().ok()))
    }
}

fn require_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(SessionError::validation("token is required"));
    }
    Ok(())
}
