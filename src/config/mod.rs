// src/config/mod.rs
//! Harvester configuration: TOML file + environment overrides.
//!
//! Resolution order:
//! 1) `$HARVEST_CONFIG_PATH` (must exist when set)
//! 2) `config/harvester.toml`
//! 3) built-in defaults
//!
//! Environment variables are applied on top, then the result is validated.
//! Any error here is fatal at startup.

pub mod duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use duration::parse_duration;

pub const ENV_CONFIG_PATH: &str = "HARVEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/harvester.toml";

/// Instances known to be fast at the time of writing; always probed.
pub const DEFAULT_BUILTIN_INSTANCES: [&str; 3] = [
    "https://nitter.tiekoetter.com",
    "https://xcancel.com",
    "https://nitter.privacyredirect.com",
];

pub const DEFAULT_STATUS_PAGE: &str = "https://status.d420.de/";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    /// Time between scheduler passes.
    #[serde(deserialize_with = "duration::deserialize")]
    pub base_interval: Duration,
    /// Expected crawl time per account; only used to size the lock TTL.
    #[serde(deserialize_with = "duration::deserialize")]
    pub per_account_estimate: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub request_timeout: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub inter_account_delay: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub instance_cache_ttl: Duration,
    /// Oldest a stale pool may get before it stops being served.
    #[serde(deserialize_with = "duration::deserialize")]
    pub instance_stale_ceiling: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub probe_timeout: Duration,
    pub probe_concurrency_limit: usize,
    #[serde(deserialize_with = "duration::deserialize_opt")]
    pub max_probe_latency: Option<Duration>,
    pub min_healthy_instances: usize,
    pub max_fetch_attempts: usize,
    pub max_pages_per_pass: usize,
    pub account_concurrency: usize,
    pub lock_key: String,
    pub builtin_instances: Vec<String>,
    pub status_pages: Vec<String>,
    pub source_retry_count: usize,
    #[serde(deserialize_with = "duration::deserialize")]
    pub source_retry_delay: Duration,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub bind: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(60),
            per_account_estimate: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            inter_account_delay: Duration::from_secs(1),
            instance_cache_ttl: Duration::from_secs(5 * 60),
            instance_stale_ceiling: Duration::from_secs(3 * 60 * 60),
            probe_timeout: Duration::from_secs(10),
            probe_concurrency_limit: 20,
            max_probe_latency: None,
            min_healthy_instances: 5,
            max_fetch_attempts: 3,
            max_pages_per_pass: 3,
            account_concurrency: 1,
            lock_key: "crawl:scheduler".to_string(),
            builtin_instances: DEFAULT_BUILTIN_INSTANCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            status_pages: vec![DEFAULT_STATUS_PAGE.to_string()],
            source_retry_count: 3,
            source_retry_delay: Duration::from_secs(2),
            database_url: None,
            redis_url: None,
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl HarvestConfig {
    /// Load using `$HARVEST_CONFIG_PATH` + fallbacks, then the process environment.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(&p);
                if !pb.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path {p}");
                }
                Self::from_file(&pb)?
            }
            Err(_) => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: HarvestConfig = toml::from_str(s)?;
        Ok(cfg)
    }

    /// Apply `HARVEST_*` / `DATABASE_URL` / `REDIS_URL` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dur = |key: &str, slot: &mut Duration| -> Result<()> {
            if let Some(v) = lookup(key) {
                *slot = parse_duration(&v).with_context(|| format!("{key}={v}"))?;
            }
            Ok(())
        };
        dur("HARVEST_BASE_INTERVAL", &mut self.base_interval)?;
        dur("HARVEST_PER_ACCOUNT_ESTIMATE", &mut self.per_account_estimate)?;
        dur("HARVEST_REQUEST_TIMEOUT", &mut self.request_timeout)?;
        dur("HARVEST_INTER_ACCOUNT_DELAY", &mut self.inter_account_delay)?;
        dur("HARVEST_INSTANCE_CACHE_TTL", &mut self.instance_cache_ttl)?;

        if let Some(v) = lookup("HARVEST_PROBE_CONCURRENCY") {
            self.probe_concurrency_limit = v
                .trim()
                .parse()
                .map_err(|_| anyhow!("HARVEST_PROBE_CONCURRENCY={v} is not a number"))?;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = Some(v);
        }
        if let Some(v) = lookup("REDIS_URL") {
            self.redis_url = Some(v);
        }
        if let Some(v) = lookup("HARVEST_BIND") {
            self.bind = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("base_interval", self.base_interval),
            ("request_timeout", self.request_timeout),
            ("instance_cache_ttl", self.instance_cache_ttl),
            ("probe_timeout", self.probe_timeout),
        ];
        for (name, d) in non_zero {
            if d.is_zero() {
                bail!("{name} must be greater than zero");
            }
        }
        if self.instance_stale_ceiling < self.instance_cache_ttl {
            bail!("instance_stale_ceiling must be >= instance_cache_ttl");
        }
        let counts = [
            ("probe_concurrency_limit", self.probe_concurrency_limit),
            ("max_fetch_attempts", self.max_fetch_attempts),
            ("max_pages_per_pass", self.max_pages_per_pass),
            ("account_concurrency", self.account_concurrency),
        ];
        for (name, n) in counts {
            if n == 0 {
                bail!("{name} must be at least 1");
            }
        }
        if self.lock_key.trim().is_empty() {
            bail!("lock_key must not be empty");
        }
        if self.builtin_instances.is_empty() && self.status_pages.is_empty() {
            bail!("no instance sources configured (builtin_instances and status_pages are both empty)");
        }
        Ok(())
    }
}
