// src/discovery/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One proxy front-end as seen by the latest probe cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateInstance {
    /// Normalized `scheme://host[:port]`; the identity of the instance.
    pub base_url: String,
    /// Name of the source that first reported this URL.
    pub origin_source: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
    pub healthy: bool,
}

impl CandidateInstance {
    /// A freshly discovered instance that has not been probed yet.
    pub fn unchecked(base_url: impl Into<String>, origin_source: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            origin_source: origin_source.into(),
            last_checked_at: None,
            latency_ms: None,
            healthy: false,
        }
    }
}

/// Immutable, latency-sorted set of healthy instances.
///
/// A pool is only ever replaced as a whole (`Arc` swap in the cache); nothing
/// mutates one after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedInstancePool {
    instances: Vec<CandidateInstance>,
    pub generated_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl RankedInstancePool {
    /// Keeps healthy entries only, deduplicates by URL and sorts by latency.
    pub fn new(mut instances: Vec<CandidateInstance>, generated_at: DateTime<Utc>, ttl: Duration) -> Self {
        instances.retain(|i| i.healthy);
        instances.sort_by(|a, b| {
            a.latency_ms
                .cmp(&b.latency_ms)
                .then_with(|| a.base_url.cmp(&b.base_url))
        });
        let mut seen = std::collections::HashSet::new();
        instances.retain(|i| seen.insert(i.base_url.clone()));
        Self {
            instances,
            generated_at,
            ttl,
        }
    }

    pub fn empty(ttl: Duration) -> Self {
        Self::new(Vec::new(), Utc::now(), ttl)
    }

    pub fn instances(&self) -> &[CandidateInstance] {
        &self.instances
    }

    pub fn urls(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.base_url.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[async_trait::async_trait]
pub trait InstanceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Candidate URLs from this origin. Never fails: an unreachable origin
    /// logs and yields an empty list.
    async fn fetch(&self) -> Vec<String>;
}
