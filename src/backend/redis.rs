use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use ::redis::aio::MultiplexedConnection;

use super::{CachedValue, CoordinationBackend, LockToken};
use crate::error::BackendError;

/// Compare-and-delete so a process never frees a lock it no longer owns.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed coordination: `SET NX PX` locks and `SET PX` cache entries.
#[derive(Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = ::redis::Client::open(url).context("parsing redis url")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("connecting to redis")?;
        tracing::info!(target: "store", "redis connected");
        Ok(Self { conn })
    }

    /// Connection handle for other Redis consumers (queue sink).
    pub fn connection(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

fn ttl_ms(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CoordinationBackend for RedisBackend {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, BackendError> {
        let token = LockToken::generate();
        let mut conn = self.conn.clone();
        let set: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(set.map(|_| token))
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, BackendError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = ::redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<CachedValue>, BackendError> {
        let mut conn = self.conn.clone();
        let (value, pttl): (Option<String>, i64) = ::redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(value.map(|value| CachedValue {
            value,
            // -1: no expiry set; treat as long-lived.
            expires_in: if pttl >= 0 {
                Duration::from_millis(pttl as u64)
            } else {
                Duration::from_secs(u32::MAX as u64)
            },
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let _: () = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
