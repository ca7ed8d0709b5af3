// src/discovery/prober.rs
//! Concurrent health probing of candidate instances.
//!
//! Every candidate gets exactly one lightweight request. At most
//! `concurrency_limit` requests are in flight at once and each one is bounded
//! by its own timeout. Unhealthy candidates only disappear from this cycle's
//! result; the caller keeps its candidate list for the next cycle.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, StreamExt};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::sources::BROWSER_UA;
use super::types::CandidateInstance;
use crate::error::ProbeFailure;

/// Body markers of a Nitter front page.
const FRONTEND_MARKERS: [&str; 4] = ["nitter", "instance", "bird", "unofficial"];
const URL_MARKERS: [&str; 4] = ["nitter", "bird", "twitter", "xcancel"];

/// Single health check against one base URL.
#[async_trait]
pub trait EndpointCheck: Send + Sync {
    async fn check(&self, base_url: &str, timeout: Duration) -> Result<(), ProbeFailure>;
}

/// GET the front page and require a 2xx Nitter-looking answer.
pub struct HttpEndpointCheck {
    client: reqwest::Client,
}

impl HttpEndpointCheck {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_UA)
            .build()
            .context("building probe http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EndpointCheck for HttpEndpointCheck {
    async fn check(&self, base_url: &str, timeout: Duration) -> Result<(), ProbeFailure> {
        if base_url.to_ascii_lowercase().contains("github") {
            return Err(ProbeFailure::NotAFrontend);
        }
        let resp = self
            .client
            .get(base_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeFailure::Status(status.as_u16()));
        }
        let body = resp.text().await.map_err(|e| classify(e, timeout))?;
        if looks_like_frontend(base_url, &body) {
            Ok(())
        } else {
            Err(ProbeFailure::NotAFrontend)
        }
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> ProbeFailure {
    if e.is_timeout() {
        ProbeFailure::Timeout(timeout)
    } else {
        ProbeFailure::Connect(e.to_string())
    }
}

/// Either the page mentions a Nitter marker or the URL itself is front-end named.
pub fn looks_like_frontend(base_url: &str, body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    let url = base_url.to_ascii_lowercase();
    FRONTEND_MARKERS.iter().any(|m| body.contains(m)) || URL_MARKERS.iter().any(|m| url.contains(m))
}

/// Outcome of one probe cycle.
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    /// Healthy instances, ascending by latency.
    pub healthy: Vec<CandidateInstance>,
    pub unhealthy: Vec<(String, ProbeFailure)>,
}

impl ProbeReport {
    pub fn is_exhausted(&self) -> bool {
        self.healthy.is_empty()
    }
}

pub struct HealthProber {
    check: Arc<dyn EndpointCheck>,
    max_latency: Option<Duration>,
    min_healthy: usize,
}

impl HealthProber {
    pub fn new(check: Arc<dyn EndpointCheck>) -> Self {
        Self {
            check,
            max_latency: None,
            min_healthy: 0,
        }
    }

    /// Drop instances slower than `limit` even when they answer correctly.
    pub fn with_max_latency(mut self, limit: Option<Duration>) -> Self {
        self.max_latency = limit;
        self
    }

    /// Warn when fewer than `n` instances survive a cycle.
    pub fn with_min_healthy(mut self, n: usize) -> Self {
        self.min_healthy = n;
        self
    }

    pub async fn probe(
        &self,
        candidates: Vec<CandidateInstance>,
        timeout: Duration,
        concurrency_limit: usize,
    ) -> ProbeReport {
        super::ensure_metrics_described();
        let total = candidates.len();
        tracing::info!(target: "discovery", candidates = total, concurrency_limit, "probing instances");

        let outcomes: Vec<(CandidateInstance, Result<Duration, ProbeFailure>)> = stream::iter(candidates)
            .map(|candidate| {
                let check = Arc::clone(&self.check);
                async move {
                    let started = Instant::now();
                    let res = match tokio::time::timeout(timeout, check.check(&candidate.base_url, timeout)).await {
                        Ok(Ok(())) => Ok(started.elapsed()),
                        Ok(Err(f)) => Err(f),
                        Err(_) => Err(ProbeFailure::Timeout(timeout)),
                    };
                    (candidate, res)
                }
            })
            .buffer_unordered(concurrency_limit.max(1))
            .collect()
            .await;

        let checked_at = Utc::now();
        let mut report = ProbeReport::default();
        for (mut candidate, res) in outcomes {
            counter!("discovery_probes_total").increment(1);
            candidate.last_checked_at = Some(checked_at);
            let res = res.and_then(|latency| match self.max_latency {
                Some(limit) if latency > limit => Err(ProbeFailure::TooSlow(latency)),
                _ => Ok(latency),
            });
            match res {
                Ok(latency) => {
                    let ms = latency.as_millis() as u64;
                    histogram!("discovery_probe_latency_ms").record(ms as f64);
                    tracing::debug!(target: "discovery", endpoint = %candidate.base_url, latency_ms = ms, "instance healthy");
                    candidate.healthy = true;
                    candidate.latency_ms = Some(ms);
                    report.healthy.push(candidate);
                }
                Err(failure) => {
                    counter!("discovery_probe_failures_total").increment(1);
                    tracing::debug!(target: "discovery", endpoint = %candidate.base_url, %failure, "instance unhealthy");
                    candidate.healthy = false;
                    candidate.latency_ms = None;
                    report.unhealthy.push((candidate.base_url, failure));
                }
            }
        }

        report.healthy.sort_by(|a, b| {
            a.latency_ms
                .cmp(&b.latency_ms)
                .then_with(|| a.base_url.cmp(&b.base_url))
        });

        if report.healthy.len() < self.min_healthy {
            tracing::warn!(
                target: "discovery",
                healthy = report.healthy.len(),
                expected = self.min_healthy,
                "fewer healthy instances than expected"
            );
        }
        tracing::info!(
            target: "discovery",
            healthy = report.healthy.len(),
            unhealthy = report.unhealthy.len(),
            "probe cycle finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_detection_uses_body_or_url() {
        assert!(looks_like_frontend("https://a.example", "<title>nitter</title>"));
        assert!(looks_like_frontend("https://xcancel.com", "<html></html>"));
        assert!(!looks_like_frontend("https://a.example", "<html>parked domain</html>"));
    }
}
