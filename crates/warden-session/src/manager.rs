//! Session lifecycle orchestration.
//!
//! The manager coordinates the record store, the per-user index, and the
//! token blacklist. The backend has no multi-key transactions, so
//! consistency comes from write ordering:
//!
//! - **create**: record, then index. A failed index write deletes the record.
//! - **revoke**: blacklist, then record.
//! - **delete**: blacklist, then index, then record.
//!
//! A token is therefore never left honored after its session is revoked or
//! gone. The index can briefly hold stale ids after a crash, which readers
//! filter out.

use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{BoundedBackend, SharedBackend};
use crate::blacklist::BlacklistLedger;
use crate::config::SessionPolicy;
use crate::error::{Result, SessionError};
use crate::index::{IndexWriteError, UserSessionIndex};
use crate::record::RecordStore;
use crate::ttl;
use crate::types::{BlacklistReason, NewSession, Session};

/// Consistent create/get/list/revoke/delete over a shared backend.
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct SessionManager {
    backend: BoundedBackend,
    records: RecordStore,
    index: UserSessionIndex,
    ledger: BlacklistLedger,
    policy: SessionPolicy,
}

impl SessionManager {
    /// Create a manager over `backend`.
    pub fn new(backend: SharedBackend, policy: SessionPolicy) -> Self {
        let backend = BoundedBackend::new(backend, policy.backend_timeout);
        let keys = policy.keys.clone();
        let min_ttl = policy.blacklist_min_ttl;

        Self {
            records: RecordStore::new(backend.clone(), keys.clone(), min_ttl),
            index: UserSessionIndex::new(backend.clone(), keys.clone()),
            ledger: BlacklistLedger::new(backend.clone(), keys, min_ttl),
            backend,
            policy,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Name of the underlying backend, for logs and probes.
    pub fn backend_name(&self) -> &'static str {
        self.backend.inner().name()
    }

    /// Issue a session.
    ///
    /// When `expires_at` is unset it is filled from the policy's session TTL.
    /// If the user index cannot be updated the record is removed again and
    /// the call fails with [`SessionError::Internal`], or with the
    /// cancellation error when `cancel` fired during the index update.
    pub async fn create(
        &self,
        mut input: NewSession,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        input.validate_fields()?;

        if input.expires_at.is_none() {
            let ttl = TimeDelta::from_std(self.policy.session_ttl)
                .map_err(|_| SessionError::validation("session TTL is out of range"))?;
            input.expires_at = Some(Utc::now() + ttl);
        }

        let session = self.records.create(input, cancel).await?;
        let index_ttl = ttl::remaining_or(
            session.expires_at,
            Utc::now(),
            self.policy.blacklist_min_ttl,
        );

        if let Err(err) = self
            .index
            .add(&session.user_identifier, &session.id, index_ttl, cancel)
            .await
        {
            self.roll_back_create(&session, &err).await;
            if err.source.is_cancelled() {
                return Err(err.source.into());
            }
            return Err(SessionError::Internal {
                message: format!("failed to index session {}", session.id),
                source: err.source,
            });
        }

        info!(
            session_id = %session.id,
            user = %session.user_identifier,
            expires_at = %session.expires_at,
            "Session created"
        );
        Ok(session)
    }

    /// Undo a record write whose index update failed.
    ///
    /// Failures here are logged and swallowed; the caller reports the
    /// original error. Runs under its own token so it also completes when
    /// the caller's token was the cause.
    async fn roll_back_create(&self, session: &Session, cause: &IndexWriteError) {
        warn!(
            session_id = %session.id,
            user = %session.user_identifier,
            step = %cause.step,
            error = %cause.source,
            "Index update failed, rolling back session record"
        );

        let cancel = CancellationToken::new();

        if let Err(e) = self.records.delete(&session.id, &cancel).await {
            error!(
                session_id = %session.id,
                error = %e,
                "Failed to roll back session record; it will linger until its TTL"
            );
        }

        if let Err(e) = self
            .index
            .remove(&session.user_identifier, &session.id, &cancel)
            .await
        {
            error!(
                session_id = %session.id,
                user = %session.user_identifier,
                error = %e,
                "Failed to remove partial index entry"
            );
        }
    }

    /// Look up a session by id.
    pub async fn get(&self, id: &str, cancel: &CancellationToken) -> Result<Session> {
        let session = self.records.get(id, cancel).await?;
        debug!(session_id = %id, "Session fetched");
        Ok(session)
    }

    /// Active (non-revoked) sessions for a user, oldest first.
    ///
    /// Index members that no longer resolve, fail to decode, or belong to a
    /// different user are skipped. Backend failures are returned.
    pub async fn list_by_user(
        &self,
        user_identifier: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Session>> {
        if user_identifier.is_empty() {
            return Err(SessionError::validation("user identifier is required"));
        }

        let ids = self.index.list(user_identifier, cancel).await?;
        let mut sessions = Vec::with_capacity(ids.len());

        for id in ids {
            match self.records.get(&id, cancel).await {
                Ok(session) if session.user_identifier != user_identifier => {
                    warn!(
                        session_id = %id,
                        user = %user_identifier,
                        "Index entry points at another user's session, skipping"
                    );
                }
                Ok(session) if session.is_revoked => {}
                Ok(session) => sessions.push(session),
                Err(SessionError::Backend(e)) => return Err(e.into()),
                Err(e) => {
                    debug!(session_id = %id, error = %e, "Skipping unresolvable index entry");
                }
            }
        }

        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    /// Revoke a session and blacklist its refresh token.
    ///
    /// The blacklist entry is written before the record is updated, so a
    /// failure between the two leaves the token blocked.
    pub async fn revoke(&self, id: &str, cancel: &CancellationToken) -> Result<Session> {
        let session = self.records.get(id, cancel).await?;
        if session.is_revoked {
            return Err(SessionError::AlreadyRevoked(id.to_string()));
        }

        let ttl = self
            .ledger
            .mark(
                &session.refresh_token,
                BlacklistReason::Revoked,
                ttl::remaining(session.expires_at, Utc::now()),
                cancel,
            )
            .await?;

        let revoked = self.records.set_revoked(id, cancel).await?;

        info!(
            session_id = %id,
            user = %revoked.user_identifier,
            reason = %BlacklistReason::Revoked,
            ttl_ms = ttl.as_millis() as u64,
            "Session revoked"
        );
        Ok(revoked)
    }

    /// Delete a session, blacklisting its token and dropping it from the
    /// user's index. Returns the record as it was before deletion.
    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> Result<Session> {
        let session = self.records.get(id, cancel).await?;

        let ttl = self
            .ledger
            .mark(
                &session.refresh_token,
                BlacklistReason::Deleted,
                ttl::remaining(session.expires_at, Utc::now()),
                cancel,
            )
            .await?;

        self.index
            .remove(&session.user_identifier, id, cancel)
            .await?;
        self.records.delete(id, cancel).await?;

        info!(
            session_id = %id,
            user = %session.user_identifier,
            reason = %BlacklistReason::Deleted,
            ttl_ms = ttl.as_millis() as u64,
            "Session deleted"
        );
        Ok(session)
    }

    /// Whether a refresh token has been blacklisted.
    pub async fn is_blacklisted(&self, token: &str, cancel: &CancellationToken) -> Result<bool> {
        self.ledger.is_marked(token, cancel).await
    }

    /// Why a refresh token was blacklisted, if it was.
    pub async fn blacklist_reason(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<BlacklistReason>> {
        self.ledger.reason(token, cancel).await
    }

    /// Round-trip to the backend.
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        Ok(self.backend.ping(cancel).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOp, KvBackend};
    use crate::error::{BackendError, BackendResult};
    use crate::memory::MemoryBackend;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Memory backend whose `expire` never completes.
    struct StalledExpire(Arc<MemoryBackend>);

    #[async_trait]
    impl KvBackend for StalledExpire {
        fn name(&self) -> &'static str {
            "stalled-expire"
        }

        async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> BackendResult<()> {
            self.0.set(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
            self.0.get(key).await
        }

        async fn delete(&self, key: &str) -> BackendResult<()> {
            self.0.delete(key).await
        }

        async fn exists(&self, key: &str) -> BackendResult<bool> {
            self.0.exists(key).await
        }

        async fn set_add(&self, key: &str, member: &str) -> BackendResult<()> {
            self.0.set_add(key, member).await
        }

        async fn set_remove(&self, key: &str, member: &str) -> BackendResult<()> {
            self.0.set_remove(key, member).await
        }

        async fn set_members(&self, key: &str) -> BackendResult<Vec<String>> {
            self.0.set_members(key).await
        }

        async fn expire(&self, _key: &str, _ttl: Duration) -> BackendResult<()> {
            std::future::pending().await
        }
    }

    fn manager() -> (Arc<MemoryBackend>, SessionManager) {
        let memory = Arc::new(MemoryBackend::new());
        let manager = SessionManager::new(memory.clone(), SessionPolicy::default());
        (memory, manager)
    }

    fn input(id: &str, user: &str, token: &str) -> NewSession {
        NewSession::new(id, user, token).with_expires_at(Utc::now() + TimeDelta::hours(24))
    }

    #[tokio::test]
    async fn test_create_fills_expiry_from_policy() {
        let memory = Arc::new(MemoryBackend::new());
        let manager = SessionManager::new(
            memory.clone(),
            SessionPolicy::new().with_session_ttl(Duration::from_secs(3600)),
        );
        let cancel = CancellationToken::new();

        let before = Utc::now();
        let session = manager
            .create(NewSession::new("s1", "a@b.com", "t1"), &cancel)
            .await
            .unwrap();

        assert!(session.expires_at > before + TimeDelta::minutes(59));
        assert!(session.expires_at <= Utc::now() + TimeDelta::hours(1));
        assert!(memory.contains_key("user_sessions:a@b.com"));
    }

    #[tokio::test]
    async fn test_create_validation_touches_nothing() {
        let (memory, manager) = manager();
        let cancel = CancellationToken::new();

        let err = manager
            .create(NewSession::new("s1", "", "t1"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(memory.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_record_failure_skips_index() {
        let (memory, manager) = manager();
        let cancel = CancellationToken::new();

        memory.fail_next(BackendOp::Set, 1);
        let err = manager
            .create(input("s1", "a@b.com", "t1"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Backend(_)));
        assert_eq!(memory.calls(BackendOp::SetAdd), 0);
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_index_insert_failure_rolls_back() {
        let (memory, manager) = manager();
        let cancel = CancellationToken::new();

        memory.fail_next(BackendOp::SetAdd, 1);
        let err = manager
            .create(input("s1", "a@b.com", "t1"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Internal { .. }));
        assert!(!memory.contains_key("session:s1"));
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_failed_compensation_still_reports_original_error() {
        let (memory, manager) = manager();
        let cancel = CancellationToken::new();

        memory.fail_next(BackendOp::Expire, 1);
        memory.fail_next(BackendOp::Delete, 1);
        let err = manager
            .create(input("s1", "a@b.com", "t1"), &cancel)
            .await
            .unwrap_err();

        match err {
            SessionError::Internal { source, .. } => {
                assert_eq!(source.op(), BackendOp::Expire);
            }
            other => panic!("expected Internal, got {other:?}"),
        }
        // Orphan record survives until its TTL; the index entry was removed
        assert!(memory.contains_key("session:s1"));
        assert!(!memory.contains_key("user_sessions:a@b.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_index_update_rolls_back() {
        let memory = Arc::new(MemoryBackend::new());
        let manager = SessionManager::new(
            Arc::new(StalledExpire(memory.clone())),
            SessionPolicy::default(),
        );
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = manager
            .create(input("s1", "a@b.com", "t1"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Backend(BackendError::Cancelled {
                op: BackendOp::Expire
            })
        ));
        assert!(!memory.contains_key("session:s1"));
        assert!(!memory.contains_key("user_sessions:a@b.com"));
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_twice() {
        let (_memory, manager) = manager();
        let cancel = CancellationToken::new();

        manager
            .create(input("s1", "a@b.com", "t1"), &cancel)
            .await
            .unwrap();

        let revoked = manager.revoke("s1", &cancel).await.unwrap();
        assert!(revoked.is_revoked);
        assert_eq!(
            manager.blacklist_reason("t1", &cancel).await.unwrap(),
            Some(BlacklistReason::Revoked)
        );

        assert!(matches!(
            manager.revoke("s1", &cancel).await,
            Err(SessionError::AlreadyRevoked(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_writes_blacklist_first() {
        let (memory, manager) = manager();
        let cancel = CancellationToken::new();

        manager
            .create(input("s1", "a@b.com", "t1"), &cancel)
            .await
            .unwrap();

        // The first write of a revoke is the blacklist marker
        memory.fail_next(BackendOp::Set, 1);
        let err = manager.revoke("s1", &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Backend(BackendError::Unavailable { .. })
        ));
        assert!(!manager.get("s1", &cancel).await.unwrap().is_revoked);
        assert!(!manager.is_blacklisted("t1", &cancel).await.unwrap());

        let sets_before = memory.calls(BackendOp::Set);
        manager.revoke("s1", &cancel).await.unwrap();
        assert_eq!(memory.calls(BackendOp::Set), sets_before + 2);
    }

    #[tokio::test]
    async fn test_delete_blacklists_before_unindexing() {
        let (memory, manager) = manager();
        let cancel = CancellationToken::new();

        manager
            .create(input("s1", "a@b.com", "t1"), &cancel)
            .await
            .unwrap();

        memory.fail_next(BackendOp::SetRemove, 1);
        let err = manager.delete("s1", &cancel).await.unwrap_err();
        assert!(matches!(err, SessionError::Backend(_)));

        // Token is already blocked; index and record are untouched
        assert_eq!(
            manager.blacklist_reason("t1", &cancel).await.unwrap(),
            Some(BlacklistReason::Deleted)
        );
        assert!(memory.contains_key("session:s1"));
        assert_eq!(manager.list_by_user("a@b.com", &cancel).await.unwrap().len(), 1);
        assert_eq!(memory.calls(BackendOp::Delete), 0);
    }

    #[tokio::test]
    async fn test_delete_blacklist_failure_removes_nothing() {
        let (memory, manager) = manager();
        let cancel = CancellationToken::new();

        manager
            .create(input("s1", "a@b.com", "t1"), &cancel)
            .await
            .unwrap();

        memory.fail_next(BackendOp::Set, 1);
        let err = manager.delete("s1", &cancel).await.unwrap_err();
        assert!(matches!(err, SessionError::Backend(_)));

        assert!(!manager.is_blacklisted("t1", &cancel).await.unwrap());
        assert!(memory.contains_key("session:s1"));
        assert!(memory.contains_key("user_sessions:a@b.com"));
        assert_eq!(memory.calls(BackendOp::SetRemove), 0);
        assert_eq!(memory.calls(BackendOp::Delete), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (memory, manager) = manager();
        let cancel = CancellationToken::new();

        assert!(manager
            .delete("nope", &cancel)
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(memory.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_list_skips_revoked_and_requires_user() {
        let (_memory, manager) = manager();
        let cancel = CancellationToken::new();

        for (id, token) in [("s1", "t1"), ("s2", "t2")] {
            manager
                .create(input(id, "a@b.com", token), &cancel)
                .await
                .unwrap();
        }
        manager.revoke("s1", &cancel).await.unwrap();

        let listed = manager.list_by_user("a@b.com", &cancel).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "s2");

        assert!(matches!(
            manager.list_by_user("", &cancel).await,
            Err(SessionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_propagates_backend_failure() {
        let (memory, manager) = manager();
        let cancel = CancellationToken::new();

        manager
            .create(input("s1", "a@b.com", "t1"), &cancel)
            .await
            .unwrap();

        memory.fail_next(BackendOp::Get, 1);
        assert!(matches!(
            manager.list_by_user("a@b.com", &cancel).await,
            Err(SessionError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_ping() {
        let (memory, manager) = manager();
        let cancel = CancellationToken::new();

        manager.ping(&cancel).await.unwrap();
        memory.fail_next(BackendOp::Ping, 1);
        assert!(manager.ping(&cancel).await.is_err());
        assert_eq!(manager.backend_name(), "memory");
    }
}
