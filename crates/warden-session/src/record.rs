//! Canonical session records, keyed by session id.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::BoundedBackend;
use crate::config::KeyLayout;
use crate::error::{Result, SessionError};
use crate::ttl;
use crate::types::{NewSession, Session};

/// Session record store.
///
/// Every write derives its TTL from the record's `expires_at`, so a rewrite
/// can shorten the key's lifetime but never extend it.
#[derive(Clone)]
pub struct RecordStore {
    backend: BoundedBackend,
    keys: KeyLayout,
    min_ttl: Duration,
}

impl RecordStore {
    /// Create a store. `min_ttl` is the floor used when rewriting a record
    /// whose expiry has already passed.
    pub fn new(backend: BoundedBackend, keys: KeyLayout, min_ttl: Duration) -> Self {
        Self {
            backend,
            keys,
            min_ttl,
        }
    }

    /// Validate and persist a new record.
    ///
    /// No existence check is made: writing an id that already exists
    /// replaces the old record.
    pub async fn create(&self, input: NewSession, cancel: &CancellationToken) -> Result<Session> {
        let now = Utc::now();
        let session = input.into_session(now)?;
        let ttl = ttl::remaining(session.expires_at, now).ok_or_else(|| {
            SessionError::validation("session expiration time must be in the future")
        })?;

        self.write(&session, ttl, cancel).await?;

        debug!(
            session_id = %session.id,
            ttl_ms = ttl.as_millis() as u64,
            "Session record written"
        );
        Ok(session)
    }

    /// Load a record.
    pub async fn get(&self, id: &str, cancel: &CancellationToken) -> Result<Session> {
        if id.is_empty() {
            return Err(SessionError::validation("session id is required"));
        }

        let bytes = self
            .backend
            .get(cancel, &self.keys.session(id))
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        Session::from_bytes(id, &bytes)
    }

    /// Mark a record revoked and rewrite it with its remaining TTL.
    ///
    /// Idempotent: revoking an already-revoked record rewrites the same
    /// content. All other fields are preserved.
    pub async fn set_revoked(&self, id: &str, cancel: &CancellationToken) -> Result<Session> {
        let mut session = self.get(id, cancel).await?;
        session.is_revoked = true;

        let ttl = ttl::remaining_or(session.expires_at, Utc::now(), self.min_ttl);
        self.write(&session, ttl, cancel).await?;

        debug!(session_id = %id, ttl_ms = ttl.as_millis() as u64, "Session record marked revoked");
        Ok(session)
    }

    /// Remove a record. Absent records are not an error.
    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        self.backend.delete(cancel, &self.keys.session(id)).await?;
        Ok(())
    }

    async fn write(
        &self,
        session: &Session,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let bytes = session.to_bytes()?;
        self.backend
            .set(cancel, &self.keys.session(&session.id), &bytes, ttl)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendOp;
    use crate::memory::MemoryBackend;
    use chrono::TimeDelta;
    use std::sync::Arc;

    fn store() -> (Arc<MemoryBackend>, RecordStore) {
        let memory = Arc::new(MemoryBackend::new());
        let backend = BoundedBackend::new(memory.clone(), None);
        let store = RecordStore::new(backend, KeyLayout::default(), Duration::from_secs(60));
        (memory, store)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (memory, store) = store();
        let cancel = CancellationToken::new();
        let expires_at = Utc::now() + TimeDelta::hours(24);

        let created = store
            .create(
                NewSession::new("s1", "a@b.com", "t1").with_expires_at(expires_at),
                &cancel,
            )
            .await
            .unwrap();

        let fetched = store.get("s1", &cancel).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.expires_at, expires_at);

        let ttl = memory.ttl("session:s1").unwrap();
        assert!(ttl <= Duration::from_secs(24 * 3600));
        assert!(ttl > Duration::from_secs(23 * 3600));
    }

    #[tokio::test]
    async fn test_create_past_expiry_writes_nothing() {
        let (memory, store) = store();
        let cancel = CancellationToken::new();

        let result = store
            .create(
                NewSession::new("s1", "a@b.com", "t1")
                    .with_expires_at(Utc::now() - TimeDelta::seconds(1)),
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(SessionError::Validation(_))));
        assert_eq!(memory.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_overwrites_same_id() {
        let (_memory, store) = store();
        let cancel = CancellationToken::new();
        let expires_at = Utc::now() + TimeDelta::hours(1);

        store
            .create(
                NewSession::new("s1", "a@b.com", "t1").with_expires_at(expires_at),
                &cancel,
            )
            .await
            .unwrap();
        store
            .create(
                NewSession::new("s1", "c@d.com", "t2").with_expires_at(expires_at),
                &cancel,
            )
            .await
            .unwrap();

        let fetched = store.get("s1", &cancel).await.unwrap();
        assert_eq!(fetched.user_identifier, "c@d.com");
        assert_eq!(fetched.refresh_token, "t2");
    }

    #[tokio::test]
    async fn test_get_missing_and_corrupt() {
        let (memory, store) = store();
        let cancel = CancellationToken::new();

        assert!(matches!(
            store.get("missing", &cancel).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            store.get("", &cancel).await,
            Err(SessionError::Validation(_))
        ));

        memory.insert_raw("session:bad", b"\x00\x01garbage", None);
        assert!(matches!(
            store.get("bad", &cancel).await,
            Err(SessionError::Corruption { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_revoked_preserves_fields_and_shrinks_ttl() {
        let (memory, store) = store();
        let cancel = CancellationToken::new();

        let created = store
            .create(
                NewSession::new("s1", "a@b.com", "t1")
                    .with_expires_at(Utc::now() + TimeDelta::minutes(30)),
                &cancel,
            )
            .await
            .unwrap();
        let ttl_before = memory.ttl("session:s1").unwrap();

        let revoked = store.set_revoked("s1", &cancel).await.unwrap();
        assert!(revoked.is_revoked);
        assert_eq!(
            Session {
                is_revoked: false,
                ..revoked.clone()
            },
            created
        );

        let ttl_after = memory.ttl("session:s1").unwrap();
        assert!(ttl_after <= ttl_before);

        // Second call is harmless
        let again = store.set_revoked("s1", &cancel).await.unwrap();
        assert_eq!(again, revoked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_revoked_on_expired_record_uses_floor() {
        let (memory, store) = store();
        let cancel = CancellationToken::new();
        let now = Utc::now();
        let stale = Session {
            id: "s1".into(),
            user_identifier: "a@b.com".into(),
            refresh_token: "t1".into(),
            is_revoked: false,
            created_at: now - TimeDelta::days(2),
            expires_at: now - TimeDelta::seconds(1),
        };
        memory.insert_raw("session:s1", &stale.to_bytes().unwrap(), None);

        store.set_revoked("s1", &cancel).await.unwrap();
        assert_eq!(memory.ttl("session:s1"), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_delete_is_unconditional() {
        let (memory, store) = store();
        let cancel = CancellationToken::new();

        store.delete("never-existed", &cancel).await.unwrap();
        assert_eq!(memory.calls(BackendOp::Delete), 1);
    }
}
