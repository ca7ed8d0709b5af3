// src/crawl/mod.rs
//! Periodic crawl of watched accounts through the ranked instance pool.

pub mod gate;
pub mod lock;
pub mod scheduler;
pub mod select;
pub mod sink;
pub mod timeline;

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

pub use gate::{filter_new, GateOutcome};
pub use lock::{lock_ttl, CrawlLock};
pub use scheduler::{
    AccountReport, AccountResult, CrawlScheduler, PassOutcome, PassReport, PassState, SchedulerSettings,
};
pub use sink::{AccountBatch, BatchSink, ChannelSink, NullSink, RedisQueueSink};
pub use timeline::{NitterRssFetcher, TimelineFetcher, TimelinePage};

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawl_passes_total", "Crawl passes by outcome.");
        describe_counter!("crawl_fetch_failures_total", "Timeline fetch attempts that failed.");
        describe_counter!("crawl_accounts_failed_total", "Accounts given up on for a pass.");
        describe_counter!("crawl_tweets_ingested_total", "Tweets newly persisted.");
        describe_histogram!("crawl_pass_duration_ms", "Wall time of completed passes.");
        describe_histogram!("crawl_parse_ms", "Time spent parsing one timeline page.");
    });
}
