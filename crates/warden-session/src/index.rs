//! Per-user secondary index of session ids.

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::backend::BoundedBackend;
use crate::config::KeyLayout;
use crate::error::{BackendError, BackendResult};

/// Which half of an index insert failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStep {
    /// Adding the id to the user's set.
    Insert,
    /// Refreshing the set's TTL.
    Expire,
}

impl fmt::Display for IndexStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => f.write_str("insert"),
            Self::Expire => f.write_str("expire"),
        }
    }
}

/// Failure of [`UserSessionIndex::add`], tagged with the step that failed.
#[derive(Debug, thiserror::Error)]
#[error("user index {step} failed: {source}")]
pub struct IndexWriteError {
    pub step: IndexStep,
    #[source]
    pub source: BackendError,
}

/// Set-valued index from user identifier to session ids.
///
/// The index is advisory: members may outlive their records (crash between
/// writes, TTL skew), so readers must resolve and re-check every id.
#[derive(Clone)]
pub struct UserSessionIndex {
    backend: BoundedBackend,
    keys: KeyLayout,
}

impl UserSessionIndex {
    pub fn new(backend: BoundedBackend, keys: KeyLayout) -> Self {
        Self { backend, keys }
    }

    /// Add `id` to the user's set, then set the set's TTL to `ttl`.
    ///
    /// The two calls are not atomic. On error the caller learns which step
    /// failed and owns the rollback.
    ///
    /// `ttl` replaces the set's TTL rather than extending it, so a short
    /// session indexed after a long one shortens the whole set. Ids whose set
    /// expires early stay readable by id but drop out of [`list`](Self::list).
    pub async fn add(
        &self,
        user_identifier: &str,
        id: &str,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), IndexWriteError> {
        let key = self.keys.user_sessions(user_identifier);

        self.backend
            .set_add(cancel, &key, id)
            .await
            .map_err(|source| IndexWriteError {
                step: IndexStep::Insert,
                source,
            })?;

        self.backend
            .expire(cancel, &key, ttl)
            .await
            .map_err(|source| IndexWriteError {
                step: IndexStep::Expire,
                source,
            })?;

        trace!(user = %user_identifier, session_id = %id, "Indexed session for user");
        Ok(())
    }

    /// Remove `id` from the user's set.
    pub async fn remove(
        &self,
        user_identifier: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> BackendResult<()> {
        self.backend
            .set_remove(cancel, &self.keys.user_sessions(user_identifier), id)
            .await
    }

    /// Raw members of the user's set.
    pub async fn list(
        &self,
        user_identifier: &str,
        cancel: &CancellationToken,
    ) -> BackendResult<Vec<String>> {
        self.backend
            .set_members(cancel, &self.keys.user_sessions(user_identifier))
            .await
    }
}
