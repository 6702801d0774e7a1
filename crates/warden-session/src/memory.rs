//! In-process key-value backend.
//!
//! Stores values and sets in a `HashMap` guarded by a non-poisoning lock.
//! Expiry is tracked per key with [`tokio::time::Instant`] and applied lazily
//! on access, so tests can drive it with a paused tokio clock.
//!
//! The backend also counts calls per operation and can be told to fail the
//! next N calls of an operation, which is how the compensation paths of the
//! lifecycle manager are exercised.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::backend::{BackendOp, KvBackend};
use crate::error::{BackendError, BackendResult};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    calls: HashMap<BackendOp, usize>,
    faults: HashMap<BackendOp, usize>,
}

impl Inner {
    /// Record a call and consume a pending fault for `op`, if any.
    fn enter(&mut self, op: BackendOp) -> BackendResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(remaining) = self.faults.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::unavailable(op, "injected fault"));
            }
        }
        Ok(())
    }

    /// Look up a live entry, reaping it if its TTL has elapsed.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }
}

/// In-memory [`KvBackend`] with lazy TTL expiry and fault injection.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail with an `Unavailable` error.
    pub fn fail_next(&self, op: BackendOp, times: usize) {
        self.inner.lock().faults.insert(op, times);
    }

    /// Number of calls made for `op`, including failed ones.
    pub fn calls(&self, op: BackendOp) -> usize {
        self.inner.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of calls made to mutating operations.
    pub fn write_calls(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|(op, _)| op.is_write())
            .map(|(_, count)| count)
            .sum()
    }

    /// Remaining TTL of a live key, or `None` if absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut inner = self.inner.lock();
        let deadline = inner.live(key)?.expires_at?;
        Some(deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether a live key exists, without counting a call.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().live(key).is_some()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.entries.retain(|_, e| !e.is_expired(now));
        inner.entries.len()
    }

    /// Check if the backend holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write raw bytes without counting a call or checking faults.
    ///
    /// Lets tests plant records the public API would refuse to create
    /// (already-expired sessions, undecodable bytes).
    pub fn insert_raw(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        let entry = Entry {
            value: Value::Bytes(value.to_vec()),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.inner.lock().entries.insert(key.to_string(), entry);
    }

    /// Add a set member without counting a call or checking faults.
    pub fn insert_member_raw(&self, key: &str, member: &str) {
        let mut inner = self.inner.lock();
        let entry = inner.entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Set(BTreeSet::new()),
            expires_at: None,
        });
        if let Value::Set(members) = &mut entry.value {
            members.insert(member.to_string());
        }
    }
}

fn wrong_type(op: BackendOp, key: &str) -> BackendError {
    BackendError::protocol(
        op,
        format!("WRONGTYPE operation against key '{key}' holding the wrong kind of value"),
    )
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(BackendOp::Set)?;
        if ttl.is_zero() {
            return Err(BackendError::protocol(BackendOp::Set, "invalid expire time"));
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value.to_vec()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        inner.enter(BackendOp::Get)?;
        match inner.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(wrong_type(BackendOp::Get, key)),
        }
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(BackendOp::Delete)?;
        inner.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        let mut inner = self.inner.lock();
        inner.enter(BackendOp::Exists)?;
        Ok(inner.live(key).is_some())
    }

    async fn set_add(&self, key: &str, member: &str) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(BackendOp::SetAdd)?;
        match inner.live(key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                members.insert(member.to_string());
                Ok(())
            }
            Some(_) => Err(wrong_type(BackendOp::SetAdd, key)),
            None => {
                inner.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Set(BTreeSet::from([member.to_string()])),
                        expires_at: None,
                    },
                );
                Ok(())
            }
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(BackendOp::SetRemove)?;
        let emptied = match inner.live(key) {
            None => false,
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                members.remove(member);
                members.is_empty()
            }
            Some(_) => return Err(wrong_type(BackendOp::SetRemove, key)),
        };
        if emptied {
            inner.entries.remove(key);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> BackendResult<Vec<String>> {
        let mut inner = self.inner.lock();
        inner.enter(BackendOp::SetMembers)?;
        match inner.live(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(BackendOp::SetMembers, key)),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(BackendOp::Expire)?;
        if let Some(entry) = inner.live(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ping(&self) -> BackendResult<()> {
        self.inner.lock().enter(BackendOp::Ping)
    }
}
