//! Redis-backed [`KvBackend`].
//!
//! Uses the async [`ConnectionManager`], which reconnects on its own and is
//! cheap to clone, so each call works on a clone of the shared handle.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::backend::{BackendOp, KvBackend};
use crate::error::{BackendError, BackendResult};

/// [`KvBackend`] over a Redis server.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to the server at `url` (`redis://[:password@]host:port[/db]`).
    pub async fn connect(url: &str) -> BackendResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| BackendError::unavailable(BackendOp::Ping, e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| map_err(BackendOp::Ping, e))?;

        info!("Connected to Redis");
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn map_err(op: BackendOp, err: redis::RedisError) -> BackendError {
    if err.kind() == redis::ErrorKind::TypeError || err.code() == Some("WRONGTYPE") {
        BackendError::protocol(op, err)
    } else {
        BackendError::unavailable(op, err)
    }
}

/// Redis TTLs are whole milliseconds; round sub-millisecond values up.
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl KvBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> BackendResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .pset_ex(key, value, ttl_millis(ttl))
            .await
            .map_err(|e| map_err(BackendOp::Set, e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| map_err(BackendOp::Get, e))
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(key)
            .await
            .map_err(|e| map_err(BackendOp::Delete, e))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key)
            .await
            .map_err(|e| map_err(BackendOp::Exists, e))
    }

    async fn set_add(&self, key: &str, member: &str) -> BackendResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .sadd(key, member)
            .await
            .map_err(|e| map_err(BackendOp::SetAdd, e))?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> BackendResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .srem(key, member)
            .await
            .map_err(|e| map_err(BackendOp::SetRemove, e))?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> BackendResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.smembers(key)
            .await
            .map_err(|e| map_err(BackendOp::SetMembers, e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<()> {
        let mut conn = self.conn.clone();
        let _: bool = conn
            .pexpire(key, ttl_millis(ttl) as i64)
            .await
            .map_err(|e| map_err(BackendOp::Expire, e))?;
        Ok(())
    }

    async fn ping(&self) -> BackendResult<()> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err(BackendOp::Ping, e))?;
        if reply != "PONG" {
            return Err(BackendError::protocol(
                BackendOp::Ping,
                format!("unexpected reply {reply:?}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounds_up() {
        assert_eq!(ttl_millis(Duration::from_micros(300)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(60)), 60_000);
    }

    #[test]
    fn test_error_mapping() {
        let wrong: redis::RedisError = (redis::ErrorKind::TypeError, "bad type").into();
        assert!(matches!(
            map_err(BackendOp::SetMembers, wrong),
            BackendError::Protocol { op: BackendOp::SetMembers, .. }
        ));

        let io: redis::RedisError = (redis::ErrorKind::IoError, "refused").into();
        assert!(matches!(
            map_err(BackendOp::Get, io),
            BackendError::Unavailable { op: BackendOp::Get, .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let result = RedisBackend::connect("not-a-redis-url").await;
        assert!(matches!(result, Err(BackendError::Unavailable { .. })));
    }
}
