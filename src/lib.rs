// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod backend;
pub mod config;
pub mod crawl;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod store;

use std::sync::Arc;

use anyhow::Result;

use crate::config::HarvestConfig;
use crate::discovery::sources::{BuiltinSource, StatusPageSource};
use crate::discovery::{HealthProber, HttpEndpointCheck, InstanceAggregator};

/// Sources and prober as configured: the built-in list first, then every
/// status page.
pub fn discovery_from_config(cfg: &HarvestConfig) -> Result<(InstanceAggregator, HealthProber)> {
    let mut aggregator = InstanceAggregator::new(Vec::new()).with_source_timeout(source_budget(cfg));
    if !cfg.builtin_instances.is_empty() {
        aggregator = aggregator.with_source(Box::new(BuiltinSource::new(cfg.builtin_instances.clone())));
    }
    for page in &cfg.status_pages {
        aggregator = aggregator.with_source(Box::new(StatusPageSource::from_url(
            page,
            cfg.request_timeout,
            cfg.source_retry_count,
            cfg.source_retry_delay,
        )?));
    }

    let prober = HealthProber::new(Arc::new(HttpEndpointCheck::new()?))
        .with_max_latency(cfg.max_probe_latency)
        .with_min_healthy(cfg.min_healthy_instances);

    Ok((aggregator, prober))
}

/// Room for every status page retry to time out, plus one request timeout of slack.
fn source_budget(cfg: &HarvestConfig) -> std::time::Duration {
    let attempts = u32::try_from(cfg.source_retry_count.max(1)).unwrap_or(u32::MAX);
    cfg.request_timeout
        .saturating_mul(attempts.saturating_add(1))
        .saturating_add(cfg.source_retry_delay.saturating_mul(attempts - 1))
}

const DEFAULT_LOG_FILTER: &str = "nitter_harvester=info,discovery=info,crawl=info,store=info,warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}
