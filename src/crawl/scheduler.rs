// src/crawl/scheduler.rs
//! One crawl pass: snapshot the pool, lock, walk accounts, release.
//!
//! Per-account failures never abort the pass. A pass that cannot take the
//! lock is skipped; a crash mid-pass is recovered by lock expiry only.
//! Discovery runs before the lock is taken, so a slow refresh never eats
//! into the lock TTL.

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use super::gate;
use super::lock::{lock_ttl, CrawlLock};
use super::select;
use super::sink::{AccountBatch, BatchSink};
use super::timeline::TimelineFetcher;
use crate::backend::CoordinationBackend;
use crate::config::HarvestConfig;
use crate::discovery::{InstanceCache, PoolStatus, RankedInstancePool};
use crate::error::FetchError;
use crate::store::{AccountRegistry, Tweet, TweetId, TweetStore, WatchedAccount};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub base_interval: Duration,
    pub per_account_estimate: Duration,
    pub inter_account_delay: Duration,
    pub max_fetch_attempts: usize,
    pub max_pages_per_pass: usize,
    pub account_concurrency: usize,
    pub lock_key: String,
}

impl SchedulerSettings {
    pub fn from_config(cfg: &HarvestConfig) -> Self {
        Self {
            base_interval: cfg.base_interval,
            per_account_estimate: cfg.per_account_estimate,
            inter_account_delay: cfg.inter_account_delay,
            max_fetch_attempts: cfg.max_fetch_attempts,
            max_pages_per_pass: cfg.max_pages_per_pass,
            account_concurrency: cfg.account_concurrency,
            lock_key: cfg.lock_key.clone(),
        }
    }
}

/// `Aborted` sticks until the next pass starts; every other pass ends in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    Idle,
    LockPending,
    Running,
    Releasing,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountResult {
    Ingested { new: usize, pages: usize },
    UpToDate,
    Failed { attempts: usize, last_error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountReport {
    pub account: String,
    pub result: AccountResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub lock_ttl_secs: u64,
    pub pool_status: PoolStatus,
    pub pool_size: usize,
    pub accounts: Vec<AccountReport>,
}

impl PassReport {
    pub fn failed(&self) -> usize {
        self.accounts
            .iter()
            .filter(|a| matches!(a.result, AccountResult::Failed { .. }))
            .count()
    }
}

#[derive(Debug, Clone)]
pub enum PassOutcome {
    /// Another owner holds the lock.
    Aborted,
    /// No usable instance; lock released without crawling.
    PoolExhausted,
    /// Registry or backend unavailable; nothing was attempted.
    Skipped(String),
    Completed(PassReport),
}

impl PassOutcome {
    fn label(&self) -> &'static str {
        match self {
            PassOutcome::Aborted => "aborted",
            PassOutcome::PoolExhausted => "pool_exhausted",
            PassOutcome::Skipped(_) => "skipped",
            PassOutcome::Completed(_) => "completed",
        }
    }
}

/// Spaces account starts at least `gap` apart across every worker of a pass.
struct Pacer {
    gap: Duration,
    next: tokio::sync::Mutex<Option<Instant>>,
}

impl Pacer {
    fn new(gap: Duration) -> Self {
        Self {
            gap,
            next: tokio::sync::Mutex::new(None),
        }
    }

    async fn wait_turn(&self) {
        if self.gap.is_zero() {
            return;
        }
        let mut next = self.next.lock().await;
        if let Some(at) = *next {
            tokio::time::sleep_until(at).await;
        }
        *next = Some(Instant::now() + self.gap);
    }
}

pub struct CrawlScheduler {
    cache: Arc<InstanceCache>,
    registry: Arc<dyn AccountRegistry>,
    store: Arc<dyn TweetStore>,
    backend: Arc<dyn CoordinationBackend>,
    fetcher: Arc<dyn TimelineFetcher>,
    sink: Arc<dyn BatchSink>,
    settings: SchedulerSettings,
    state: Mutex<PassState>,
    last_report: RwLock<Option<PassReport>>,
}

impl CrawlScheduler {
    pub fn new(
        cache: Arc<InstanceCache>,
        registry: Arc<dyn AccountRegistry>,
        store: Arc<dyn TweetStore>,
        backend: Arc<dyn CoordinationBackend>,
        fetcher: Arc<dyn TimelineFetcher>,
        sink: Arc<dyn BatchSink>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            cache,
            registry,
            store,
            backend,
            fetcher,
            sink,
            settings,
            state: Mutex::new(PassState::Idle),
            last_report: RwLock::new(None),
        }
    }

    pub fn state(&self) -> PassState {
        *self.state.lock().expect("state mutex poisoned")
    }

    pub fn last_report(&self) -> Option<PassReport> {
        self.last_report.read().expect("report rwlock poisoned").clone()
    }

    fn set_state(&self, next: PassState) {
        *self.state.lock().expect("state mutex poisoned") = next;
    }

    /// Tick every `base_interval` until `shutdown` resolves. A pass that runs
    /// past its tick delays the next one instead of stacking.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.settings.base_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(target: "crawl", "scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_pass().await {
                        PassOutcome::Completed(r) => tracing::info!(
                            target: "crawl",
                            accounts = r.accounts.len(),
                            failed = r.failed(),
                            duration_ms = r.duration_ms,
                            "pass completed"
                        ),
                        PassOutcome::Aborted => tracing::info!(target: "crawl", "pass skipped, lock held elsewhere"),
                        PassOutcome::PoolExhausted => tracing::warn!(target: "crawl", "pass skipped, no usable instance"),
                        PassOutcome::Skipped(reason) => tracing::warn!(target: "crawl", %reason, "pass skipped"),
                    }
                }
            }
        }
    }

    pub async fn run_pass(&self) -> PassOutcome {
        super::ensure_metrics_described();
        let outcome = self.run_pass_inner().await;
        counter!("crawl_passes_total", "outcome" => outcome.label()).increment(1);
        if let PassOutcome::Completed(report) = &outcome {
            *self.last_report.write().expect("report rwlock poisoned") = Some(report.clone());
        }
        if !matches!(outcome, PassOutcome::Aborted) {
            self.set_state(PassState::Idle);
        }
        outcome
    }

    async fn run_pass_inner(&self) -> PassOutcome {
        let started_at = Utc::now();
        let t0 = Instant::now();
        self.set_state(PassState::LockPending);

        let accounts = match self.registry.list_active().await {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(target: "crawl", error = ?e, "could not list watched accounts");
                return PassOutcome::Skipped(format!("registry: {e:#}"));
            }
        };

        let snapshot = self.cache.get_pool(false).await;

        let s = &self.settings;
        let ttl = lock_ttl(accounts.len(), s.per_account_estimate, s.base_interval);
        let lock = match CrawlLock::acquire(self.backend.as_ref(), &s.lock_key, ttl).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                self.set_state(PassState::Aborted);
                return PassOutcome::Aborted;
            }
            Err(e) => {
                tracing::warn!(target: "crawl", error = %e, "lock backend unavailable");
                return PassOutcome::Skipped(format!("lock: {e}"));
            }
        };

        self.set_state(PassState::Running);
        let outcome = if snapshot.is_usable() {
            tracing::info!(
                target: "crawl",
                accounts = accounts.len(),
                instances = snapshot.pool.len(),
                lock_ttl_secs = ttl.as_secs(),
                "pass started"
            );
            let pool = Arc::clone(&snapshot.pool);
            let pacer = Pacer::new(self.settings.inter_account_delay);
            let reports: Vec<AccountReport> = stream::iter(accounts)
                .map(|account| {
                    let pool = Arc::clone(&pool);
                    let pacer = &pacer;
                    async move {
                        pacer.wait_turn().await;
                        self.crawl_account(&account, &pool).await
                    }
                })
                .buffered(self.settings.account_concurrency.max(1))
                .collect()
                .await;

            let duration = t0.elapsed();
            histogram!("crawl_pass_duration_ms").record(duration.as_secs_f64() * 1_000.0);
            PassOutcome::Completed(PassReport {
                started_at,
                duration_ms: duration.as_millis() as u64,
                lock_ttl_secs: ttl.as_secs(),
                pool_status: snapshot.status,
                pool_size: snapshot.pool.len(),
                accounts: reports,
            })
        } else {
            PassOutcome::PoolExhausted
        };

        self.set_state(PassState::Releasing);
        if let Err(e) = lock.release(self.backend.as_ref()).await {
            tracing::warn!(target: "crawl", error = %e, "lock release failed, leaving it to expire");
        }
        outcome
    }

    async fn crawl_account(&self, account: &WatchedAccount, pool: &RankedInstancePool) -> AccountReport {
        let name = account.username.as_str();
        let result = self.crawl_account_inner(name, pool).await;
        if let AccountResult::Failed { attempts, last_error } = &result {
            counter!("crawl_accounts_failed_total").increment(1);
            tracing::warn!(target: "crawl", account = name, attempts, last_error = %last_error, "account failed for this pass");
        }
        AccountReport {
            account: account.username.clone(),
            result,
        }
    }

    async fn crawl_account_inner(&self, account: &str, pool: &RankedInstancePool) -> AccountResult {
        let cursor = match self.store.cursor(account).await {
            Ok(c) => c,
            Err(e) => {
                return AccountResult::Failed {
                    attempts: 0,
                    last_error: format!("reading cursor: {e:#}"),
                }
            }
        };

        let mut tried: Vec<String> = Vec::new();
        let mut last_error = String::from("no endpoint available");
        while tried.len() < self.settings.max_fetch_attempts {
            let endpoint = {
                let mut rng = rand::rng();
                select::pick(pool.instances(), &tried, &mut rng).map(|i| i.base_url.clone())
            };
            let Some(endpoint) = endpoint else { break };
            tried.push(endpoint.clone());

            match self.fetch_fresh(&endpoint, account, cursor).await {
                Ok((fresh, pages)) => return self.persist(account, fresh, pages, tried.len()).await,
                Err(e) => {
                    counter!("crawl_fetch_failures_total").increment(1);
                    tracing::warn!(
                        target: "crawl",
                        account,
                        endpoint = %endpoint,
                        attempt = tried.len(),
                        error = %e,
                        "timeline fetch failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        AccountResult::Failed {
            attempts: tried.len(),
            last_error,
        }
    }

    /// Pull pages from one endpoint until the cursor is reached, the endpoint
    /// runs out of pages, or the per-pass page budget is spent. Any page
    /// failure fails the whole attempt so the cursor never skips a gap.
    async fn fetch_fresh(
        &self,
        endpoint: &str,
        account: &str,
        cursor: Option<TweetId>,
    ) -> Result<(Vec<Tweet>, usize), FetchError> {
        let mut fresh = Vec::new();
        let mut seen = HashSet::new();
        let mut page_cursor: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = self
                .fetcher
                .fetch_page(endpoint, account, page_cursor.as_deref())
                .await?;
            pages += 1;
            let exhausted = page.tweets.is_empty();
            let outcome = gate::filter_new(cursor, page.tweets);
            let mut batch = outcome.fresh;
            gate::drop_seen(&mut batch, &mut seen);
            fresh.extend(batch);

            if outcome.cursor_reached || exhausted {
                break;
            }
            if pages >= self.settings.max_pages_per_pass.max(1) {
                if cursor.is_some() {
                    tracing::debug!(target: "crawl", account, pages, "page budget spent before reaching cursor");
                }
                break;
            }
            match page.next_cursor {
                Some(next) => page_cursor = Some(next),
                None => break,
            }
        }
        Ok((fresh, pages))
    }

    async fn persist(&self, account: &str, fresh: Vec<Tweet>, pages: usize, attempts: usize) -> AccountResult {
        let Some(newest) = fresh.iter().map(|t| t.tweet_id).max() else {
            self.mark_crawled(account).await;
            return AccountResult::UpToDate;
        };

        let inserted = match self.store.insert_if_absent(&fresh).await {
            Ok(n) => n,
            Err(e) => {
                return AccountResult::Failed {
                    attempts,
                    last_error: format!("persisting tweets: {e:#}"),
                }
            }
        };
        if let Err(e) = self.store.advance_cursor(account, newest).await {
            return AccountResult::Failed {
                attempts,
                last_error: format!("advancing cursor: {e:#}"),
            };
        }
        counter!("crawl_tweets_ingested_total").increment(inserted as u64);

        let batch = AccountBatch {
            account: account.to_string(),
            tweets: fresh,
        };
        if let Err(e) = self.sink.emit(batch).await {
            tracing::warn!(target: "crawl", account, error = ?e, "downstream emit failed");
        }
        self.mark_crawled(account).await;
        tracing::info!(target: "crawl", account, new = inserted, pages, cursor = newest, "account ingested");
        AccountResult::Ingested { new: inserted, pages }
    }

    async fn mark_crawled(&self, account: &str) {
        if let Err(e) = self.store.set_last_crawled_at(account, Utc::now()).await {
            tracing::warn!(target: "crawl", account, error = ?e, "could not record last_crawled_at");
        }
    }
}
