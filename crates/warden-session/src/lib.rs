//! Refresh-token session lifecycle over a TTL-capable key-value store.
//!
//! This crate keeps three keyspaces consistent without multi-key
//! transactions:
//! - Session records, keyed by session id, expiring at the session's
//!   `expires_at`
//! - A per-user index of session ids
//! - A blacklist of refresh tokens from revoked or deleted sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use warden_session::{MemoryBackend, NewSession, SessionManager, SessionPolicy};
//!
//! let manager = SessionManager::new(Arc::new(MemoryBackend::new()), SessionPolicy::default());
//! let cancel = CancellationToken::new();
//!
//! let session = manager
//!     .create(NewSession::new("s1", "a@b.com", "t1"), &cancel)
//!     .await?;
//! manager.revoke(&session.id, &cancel).await?;
//! assert!(manager.is_blacklisted("t1", &cancel).await?);
//! ```

mod backend;
mod blacklist;
mod config;
mod error;
mod index;
mod manager;
mod memory;
mod record;
#[cfg(feature = "redis")]
mod redis_backend;
mod ttl;
mod types;

pub use backend::{BackendOp, BoundedBackend, KvBackend, SharedBackend};
pub use blacklist::BlacklistLedger;
pub use config::{
    DEFAULT_BACKEND_TIMEOUT, DEFAULT_BLACKLIST_MIN_TTL, DEFAULT_SESSION_TTL, KeyLayout,
    SessionPolicy,
};
pub use error::{BackendError, BackendResult, Result, SessionError};
pub use index::{IndexStep, IndexWriteError, UserSessionIndex};
pub use manager::SessionManager;
pub use memory::MemoryBackend;
pub use record::RecordStore;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
pub use types::{BlacklistReason, NewSession, Session};
