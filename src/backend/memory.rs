use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{CachedValue, CoordinationBackend, LockToken};
use crate::error::BackendError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Single-process backend. Uses the tokio clock so paused-time tests can
/// drive expiry deterministically.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<HashMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(map: &mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<Entry> {
        match map.get(key) {
            Some(e) if e.expires_at > now => Some(e.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl CoordinationBackend for MemoryBackend {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, BackendError> {
        let now = Instant::now();
        let mut map = self.inner.lock().expect("memory backend poisoned");
        if Self::live(&mut map, key, now).is_some() {
            return Ok(None);
        }
        let token = LockToken::generate();
        map.insert(
            key.to_string(),
            Entry {
                value: token.as_str().to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, BackendError> {
        let now = Instant::now();
        let mut map = self.inner.lock().expect("memory backend poisoned");
        match Self::live(&mut map, key, now) {
            Some(e) if e.value == token.as_str() => {
                map.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<CachedValue>, BackendError> {
        let now = Instant::now();
        let mut map = self.inner.lock().expect("memory backend poisoned");
        Ok(Self::live(&mut map, key, now).map(|e| CachedValue {
            value: e.value,
            expires_in: e.expires_at.saturating_duration_since(now),
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let now = Instant::now();
        let mut map = self.inner.lock().expect("memory backend poisoned");
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
