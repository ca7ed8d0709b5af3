// src/backend/mod.rs
//! Cross-process coordination: TTL locks and a small shared key/value cache.
//!
//! Locks and cache entries share one keyspace, the same way they would in a
//! single Redis database.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::BackendError;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

/// Proof of lock ownership; only the holder of the token can release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value read from the shared cache together with its remaining lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedValue {
    pub value: String,
    pub expires_in: Duration,
}

#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    /// Atomically create `key` with a fresh token if it does not exist.
    /// `Ok(None)` means someone else holds it.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, BackendError>;

    /// Delete `key` only if it still holds `token`. Returns whether it did.
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, BackendError>;

    async fn get(&self, key: &str) -> Result<Option<CachedValue>, BackendError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;
}
