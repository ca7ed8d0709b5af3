// src/discovery/cache.rs
//! Ranked instance cache.
//!
//! Readers get an `Arc` to an immutable pool. A refresh (aggregate + probe)
//! runs at most once at a time; callers that arrive while one is in flight
//! wait for it and take its result instead of starting their own.
//!
//! When a refresh finds nothing healthy the previous pool keeps being served
//! (flagged `Stale`) until it is older than the staleness ceiling; after that
//! callers get an empty pool flagged `Exhausted`.

use chrono::Utc;
use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::prober::HealthProber;
use super::types::{CandidateInstance, RankedInstancePool};
use super::{InstanceAggregator, SHARED_POOL_KEY};
use crate::backend::CoordinationBackend;
use crate::config::HarvestConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    /// Probed within the TTL.
    Fresh,
    /// Last refresh found nothing; serving the previous pool.
    Stale,
    /// Nothing usable. The pool is empty.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub pool: Arc<RankedInstancePool>,
    pub status: PoolStatus,
}

impl PoolSnapshot {
    pub fn is_usable(&self) -> bool {
        self.status != PoolStatus::Exhausted && !self.pool.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub stale_ceiling: Duration,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
}

impl CacheSettings {
    pub fn from_config(cfg: &HarvestConfig) -> Self {
        Self {
            ttl: cfg.instance_cache_ttl,
            stale_ceiling: cfg.instance_stale_ceiling,
            probe_timeout: cfg.probe_timeout,
            probe_concurrency: cfg.probe_concurrency_limit,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    pool: Arc<RankedInstancePool>,
    status: PoolStatus,
    fresh_until: Instant,
    usable_until: Instant,
}

impl Slot {
    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            pool: Arc::clone(&self.pool),
            status: self.status,
        }
    }
}

pub struct InstanceCache {
    aggregator: InstanceAggregator,
    prober: HealthProber,
    shared: Option<Arc<dyn CoordinationBackend>>,
    settings: CacheSettings,
    current: RwLock<Option<Slot>>,
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
    probe_cycles: AtomicU64,
}

impl InstanceCache {
    pub fn new(aggregator: InstanceAggregator, prober: HealthProber, settings: CacheSettings) -> Self {
        Self {
            aggregator,
            prober,
            shared: None,
            settings,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
            probe_cycles: AtomicU64::new(0),
        }
    }

    /// Share pools with other processes through `backend`.
    pub fn with_shared_backend(mut self, backend: Arc<dyn CoordinationBackend>) -> Self {
        self.shared = Some(backend);
        self
    }

    /// Number of aggregate+probe cycles actually executed.
    pub fn probe_cycles(&self) -> u64 {
        self.probe_cycles.load(Ordering::Acquire)
    }

    /// Current snapshot without refreshing, if any pool was ever published.
    pub fn peek(&self) -> Option<PoolSnapshot> {
        self.current
            .read()
            .expect("pool rwlock poisoned")
            .as_ref()
            .map(Slot::snapshot)
    }

    pub async fn get_pool(&self, force_refresh: bool) -> PoolSnapshot {
        if !force_refresh {
            if let Some(hit) = self.fresh() {
                return hit;
            }
        }

        let seen = self.generation.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;

        // Someone refreshed while we were waiting: take their result.
        if self.generation.load(Ordering::Acquire) != seen {
            if let Some(snap) = self.peek() {
                return snap;
            }
        }
        if !force_refresh {
            if let Some(hit) = self.fresh() {
                return hit;
            }
        }

        self.refresh_locked(force_refresh).await
    }

    fn fresh(&self) -> Option<PoolSnapshot> {
        let now = Instant::now();
        let guard = self.current.read().expect("pool rwlock poisoned");
        guard
            .as_ref()
            .filter(|s| now < s.fresh_until)
            .map(Slot::snapshot)
    }

    fn publish(&self, slot: Slot) -> PoolSnapshot {
        let snap = slot.snapshot();
        gauge!("discovery_pool_size").set(slot.pool.len() as f64);
        *self.current.write().expect("pool rwlock poisoned") = Some(slot);
        self.generation.fetch_add(1, Ordering::AcqRel);
        snap
    }

    async fn refresh_locked(&self, force_refresh: bool) -> PoolSnapshot {
        super::ensure_metrics_described();
        let ttl = self.settings.ttl;

        if !force_refresh {
            if let Some(snap) = self.adopt_shared().await {
                return snap;
            }
        }

        let candidates: Vec<CandidateInstance> = self
            .aggregator
            .collect()
            .await
            .into_iter()
            .map(|(url, origin)| CandidateInstance::unchecked(url, origin))
            .collect();

        let report = self
            .prober
            .probe(
                candidates,
                self.settings.probe_timeout,
                self.settings.probe_concurrency,
            )
            .await;
        self.probe_cycles.fetch_add(1, Ordering::AcqRel);
        counter!("discovery_refresh_total").increment(1);

        let now = Instant::now();
        if !report.healthy.is_empty() {
            let pool = Arc::new(RankedInstancePool::new(report.healthy, Utc::now(), ttl));
            self.write_shared(&pool).await;
            tracing::info!(target: "discovery", instances = pool.len(), "instance pool refreshed");
            return self.publish(Slot {
                pool,
                status: PoolStatus::Fresh,
                fresh_until: now + ttl,
                usable_until: now + self.settings.stale_ceiling,
            });
        }

        counter!("discovery_pool_exhausted_total").increment(1);
        let previous = self.current.read().expect("pool rwlock poisoned").clone();
        match previous {
            Some(prev) if !prev.pool.is_empty() && now < prev.usable_until => {
                tracing::warn!(
                    target: "discovery",
                    instances = prev.pool.len(),
                    generated_at = %prev.pool.generated_at,
                    "no healthy instance found, keeping previous pool"
                );
                let retry_at = (now + ttl).min(prev.usable_until);
                self.publish(Slot {
                    pool: prev.pool,
                    status: PoolStatus::Stale,
                    fresh_until: retry_at,
                    usable_until: prev.usable_until,
                })
            }
            _ => {
                tracing::error!(target: "discovery", "no healthy instance and no usable previous pool");
                self.publish(Slot {
                    pool: Arc::new(RankedInstancePool::empty(ttl)),
                    status: PoolStatus::Exhausted,
                    fresh_until: now,
                    usable_until: now,
                })
            }
        }
    }

    async fn adopt_shared(&self) -> Option<PoolSnapshot> {
        let shared = self.shared.as_ref()?;
        let cached = match shared.get(SHARED_POOL_KEY).await {
            Ok(Some(v)) => v,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(target: "discovery", error = %e, "shared pool read failed, probing locally");
                return None;
            }
        };
        let decoded: RankedInstancePool = match serde_json::from_str(&cached.value) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(target: "discovery", error = %e, "ignoring malformed shared pool");
                return None;
            }
        };
        // Another writer's entry gets the same healthy-only, latency order as ours.
        let pool = RankedInstancePool::new(decoded.instances().to_vec(), decoded.generated_at, decoded.ttl);
        if pool.is_empty() {
            return None;
        }
        let now = Instant::now();
        tracing::info!(target: "discovery", instances = pool.len(), "adopted shared instance pool");
        Some(self.publish(Slot {
            pool: Arc::new(pool),
            status: PoolStatus::Fresh,
            fresh_until: now + cached.expires_in.min(self.settings.ttl),
            usable_until: now + self.settings.stale_ceiling,
        }))
    }

    async fn write_shared(&self, pool: &RankedInstancePool) {
        let Some(shared) = self.shared.as_ref() else {
            return;
        };
        match serde_json::to_string(pool) {
            Ok(json) => {
                if let Err(e) = shared.set(SHARED_POOL_KEY, &json, self.settings.ttl).await {
                    tracing::warn!(target: "discovery", error = %e, "shared pool write failed");
                }
            }
            Err(e) => tracing::warn!(target: "discovery", error = %e, "pool serialization failed"),
        }
    }
}
