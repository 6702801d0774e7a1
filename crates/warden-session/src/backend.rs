//! Key-value backend capability interface.
//!
//! The session core never talks to a concrete store. It is written against
//! [`KvBackend`], a small set of single-key primitives with per-key TTL plus
//! set-membership operations. Implementations:
//!
//! - [`MemoryBackend`](crate::MemoryBackend): in-process map, used for tests
//!   and local development.
//! - `RedisBackend` (feature `redis`): a Redis connection manager.
//!
//! Every call the core makes goes through [`BoundedBackend`], which applies
//! the caller's cancellation token and the configured per-call timeout.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{BackendError, BackendResult};

/// Names of the backend primitives, used in errors, logs, and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    Set,
    Get,
    Delete,
    Exists,
    SetAdd,
    SetRemove,
    SetMembers,
    Expire,
    Ping,
}

impl BackendOp {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Get => "get",
            Self::Delete => "delete",
            Self::Exists => "exists",
            Self::SetAdd => "set_add",
            Self::SetRemove => "set_remove",
            Self::SetMembers => "set_members",
            Self::Expire => "expire",
            Self::Ping => "ping",
        }
    }

    /// Whether the operation mutates the store.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Set | Self::Delete | Self::SetAdd | Self::SetRemove | Self::Expire
        )
    }
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for TTL-capable key-value stores.
///
/// Keys are plain strings. Values written with [`set`](Self::set) are opaque
/// bytes; set-typed keys hold string members. A key holds either a value or a
/// set, never both.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one backend is shared by every
/// store and every request task.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Short name used in logs and health reports.
    fn name(&self) -> &'static str;

    /// Write `value` under `key`, replacing any previous value, expiring after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> BackendResult<()>;

    /// Read the value under `key`. Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> BackendResult<()>;

    /// Check whether `key` exists.
    async fn exists(&self, key: &str) -> BackendResult<bool>;

    /// Add `member` to the set under `key`, creating the set if needed.
    async fn set_add(&self, key: &str, member: &str) -> BackendResult<()>;

    /// Remove `member` from the set under `key`. An emptied set may be reaped.
    async fn set_remove(&self, key: &str, member: &str) -> BackendResult<()>;

    /// List members of the set under `key`. A missing key is an empty set.
    async fn set_members(&self, key: &str) -> BackendResult<Vec<String>>;

    /// Set or refresh the TTL of an existing key. A missing key is a no-op.
    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<()>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> BackendResult<()> {
        Ok(())
    }
}

/// Shared handle to a backend.
pub type SharedBackend = Arc<dyn KvBackend>;

/// A backend handle that bounds every call by cancellation and timeout.
///
/// Stores hold one of these rather than the raw backend so that each call
/// honors the caller's [`CancellationToken`] and the per-call deadline.
/// No call is retried.
#[derive(Clone)]
pub struct BoundedBackend {
    inner: SharedBackend,
    timeout: Option<Duration>,
}

impl BoundedBackend {
    /// Wrap a backend with an optional per-call timeout.
    pub fn new(inner: SharedBackend, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &SharedBackend {
        &self.inner
    }

    /// The per-call timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn guard<T, F>(
        &self,
        op: BackendOp,
        cancel: &CancellationToken,
        call: F,
    ) -> BackendResult<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled { op });
        }

        let timeout = self.timeout;
        let bounded = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Timeout { op, after: limit }),
                },
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BackendError::Cancelled { op }),
            result = bounded => result,
        }
    }

    pub async fn set(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> BackendResult<()> {
        self.guard(BackendOp::Set, cancel, self.inner.set(key, value, ttl))
            .await
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> BackendResult<Option<Vec<u8>>> {
        self.guard(BackendOp::Get, cancel, self.inner.get(key)).await
    }

    pub async fn delete(&self, cancel: &CancellationToken, key: &str) -> BackendResult<()> {
        self.guard(BackendOp::Delete, cancel, self.inner.delete(key))
            .await
    }

    pub async fn exists(&self, cancel: &CancellationToken, key: &str) -> BackendResult<bool> {
        self.guard(BackendOp::Exists, cancel, self.inner.exists(key))
            .await
    }

    pub async fn set_add(
        &self,
        cancel: &CancellationToken,
        key: &str,
        member: &str,
    ) -> BackendResult<()> {
        self.guard(BackendOp::SetAdd, cancel, self.inner.set_add(key, member))
            .await
    }

    pub async fn set_remove(
        &self,
        cancel: &CancellationToken,
        key: &str,
        member: &str,
    ) -> BackendResult<()> {
        self.guard(
            BackendOp::SetRemove,
            cancel,
            self.inner.set_remove(key, member),
        )
        .await
    }

    pub async fn set_members(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> BackendResult<Vec<String>> {
        self.guard(BackendOp::SetMembers, cancel, self.inner.set_members(key))
            .await
    }

    pub async fn expire(
        &self,
        cancel: &CancellationToken,
        key: &str,
        ttl: Duration,
    ) -> BackendResult<()> {
        self.guard(BackendOp::Expire, cancel, self.inner.expire(key, ttl))
            .await
    }

    pub async fn ping(&self, cancel: &CancellationToken) -> BackendResult<()> {
        self.guard(BackendOp::Ping, cancel, self.inner.ping()).await
    }
}
