// src/crawl/lock.rs
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::backend::{CoordinationBackend, LockToken};
use crate::error::BackendError;

const LOCK_PREFIX: &str = "lock:";

/// TTL for a pass over `accounts` accounts.
///
/// Long enough for the expected work plus one interval, and never shorter
/// than two intervals, so a slow pass does not lose its lock mid-flight.
pub fn lock_ttl(accounts: usize, per_account: Duration, base_interval: Duration) -> Duration {
    let n = u32::try_from(accounts).unwrap_or(u32::MAX);
    let expected = per_account.saturating_mul(n).saturating_add(base_interval);
    expected.max(base_interval.saturating_mul(2))
}

/// A held scheduler lock. Dropping it without `release` leaves TTL expiry
/// as the only way out.
#[derive(Debug, Clone)]
pub struct CrawlLock {
    pub key: String,
    pub owner_token: LockToken,
    pub acquired_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CrawlLock {
    /// `Ok(None)` when another owner holds the lock.
    pub async fn acquire(
        backend: &dyn CoordinationBackend,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Self>, BackendError> {
        let key = format!("{LOCK_PREFIX}{name}");
        let token = backend.try_acquire(&key, ttl).await?;
        Ok(token.map(|owner_token| {
            tracing::debug!(target: "crawl", key = %key, ttl_secs = ttl.as_secs(), "lock acquired");
            Self {
                key,
                owner_token,
                acquired_at: Utc::now(),
                ttl,
            }
        }))
    }

    /// Returns false when the lock had already expired or changed hands.
    pub async fn release(self, backend: &dyn CoordinationBackend) -> Result<bool, BackendError> {
        let released = backend.release(&self.key, &self.owner_token).await?;
        if !released {
            tracing::warn!(
                target: "crawl",
                key = %self.key,
                held_for_secs = (Utc::now() - self.acquired_at).num_seconds(),
                "lock was no longer ours at release"
            );
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_covers_work_or_two_intervals() {
        let est = Duration::from_secs(5);
        let base = Duration::from_secs(60);
        assert_eq!(lock_ttl(20, est, base), Duration::from_secs(160));
        assert_eq!(lock_ttl(2, est, base), Duration::from_secs(120));
        assert_eq!(lock_ttl(0, est, base), Duration::from_secs(120));
    }
}
