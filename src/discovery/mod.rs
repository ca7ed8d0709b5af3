// src/discovery/mod.rs
//! Instance discovery: source aggregation, health probing and the ranked pool cache.

pub mod cache;
pub mod prober;
pub mod sources;
pub mod types;

use crate::discovery::types::InstanceSource;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use url::Url;

pub use cache::{InstanceCache, PoolSnapshot, PoolStatus};
pub use prober::{EndpointCheck, HealthProber, HttpEndpointCheck, ProbeReport};
pub use types::{CandidateInstance, RankedInstancePool};

/// Redis key (or in-memory key) under which the shared pool is published.
pub const SHARED_POOL_KEY: &str = "nitter:instances:available";

/// Upper bound on a single source's `fetch` unless configured otherwise.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(120);

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_gauge!(
            "discovery_source_instances",
            "Candidate instances reported by each source in the last aggregation."
        );
        describe_counter!(
            "discovery_source_errors_total",
            "Listing sources that yielded nothing because of a fetch/parse error."
        );
        describe_counter!("discovery_probes_total", "Endpoint probes issued.");
        describe_counter!(
            "discovery_probe_failures_total",
            "Endpoint probes classified unhealthy."
        );
        describe_histogram!("discovery_probe_latency_ms", "Latency of healthy probes.");
        describe_gauge!("discovery_pool_size", "Healthy instances in the current pool.");
        describe_counter!("discovery_refresh_total", "Pool refresh cycles executed.");
        describe_counter!(
            "discovery_pool_exhausted_total",
            "Refreshes that ended with no usable instance."
        );
    });
}

/// Reduce any instance URL to `scheme://host[:port]`.
///
/// Host is lowercased, default ports, paths, queries and trailing slashes are
/// dropped. A bare host gets `https://`. Non-http(s) or unparseable inputs
/// yield `None`.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = Url::parse(&candidate).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Unions the candidate lists of every registered source.
pub struct InstanceAggregator {
    sources: Vec<Box<dyn InstanceSource>>,
    source_timeout: Duration,
}

impl InstanceAggregator {
    pub fn new(sources: Vec<Box<dyn InstanceSource>>) -> Self {
        Self {
            sources,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    /// A source still running after `timeout` contributes nothing this round.
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Register another source without touching the existing ones.
    pub fn with_source(mut self, source: Box<dyn InstanceSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Normalized URL -> name of the first source (in registration order) that reported it.
    pub async fn collect(&self) -> BTreeMap<String, String> {
        ensure_metrics_described();

        let limit = self.source_timeout;
        let results = futures::future::join_all(self.sources.iter().map(|s| async move {
            let urls = match tokio::time::timeout(limit, s.fetch()).await {
                Ok(urls) => urls,
                Err(_) => {
                    tracing::warn!(
                        target: "discovery",
                        source = s.name(),
                        timeout_ms = limit.as_millis() as u64,
                        "source timed out, skipping it this round"
                    );
                    record_source_error(s.name());
                    Vec::new()
                }
            };
            (s.name(), urls)
        }))
        .await;

        let mut out: BTreeMap<String, String> = BTreeMap::new();
        for (name, urls) in results {
            let mut kept = 0usize;
            for raw in urls {
                match normalize_base_url(&raw) {
                    Some(url) => {
                        kept += 1;
                        out.entry(url).or_insert_with(|| name.to_string());
                    }
                    None => tracing::debug!(target: "discovery", source = name, url = %raw, "dropping unparseable candidate"),
                }
            }
            gauge!("discovery_source_instances", "source" => name.to_string()).set(kept as f64);
            tracing::info!(target: "discovery", source = name, candidates = kept, "source aggregated");
        }

        tracing::info!(
            target: "discovery",
            sources = self.sources.len(),
            unique = out.len(),
            "aggregated candidate instances"
        );
        out
    }

    /// Deduplicated set of normalized candidate URLs across all sources.
    pub async fn fetch_all(&self) -> BTreeSet<String> {
        self.collect().await.into_keys().collect()
    }
}

/// Counter bump for a source that had to give up; shared by source impls.
pub(crate) fn record_source_error(source: &str) {
    counter!("discovery_source_errors_total", "source" => source.to_string()).increment(1);
}
