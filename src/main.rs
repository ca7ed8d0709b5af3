//! nitter-harvester: instance discovery + periodic timeline crawl.
//! Boots the ops HTTP server and runs the scheduler until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};

use nitter_harvester::api::{self, AppState};
use nitter_harvester::backend::{CoordinationBackend, MemoryBackend, RedisBackend};
use nitter_harvester::config::HarvestConfig;
use nitter_harvester::crawl::{BatchSink, CrawlScheduler, NitterRssFetcher, NullSink, RedisQueueSink, SchedulerSettings};
use nitter_harvester::discovery::cache::CacheSettings;
use nitter_harvester::discovery::InstanceCache;
use nitter_harvester::metrics::Metrics;
use nitter_harvester::store::{AccountRegistry, MemoryStore, PgStore, TweetStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    nitter_harvester::init_tracing();

    let cfg = HarvestConfig::load().context("loading harvester config")?;
    let metrics = Metrics::init(&cfg)?;

    // --- coordination backend + downstream queue ---
    let (backend, sink): (Arc<dyn CoordinationBackend>, Arc<dyn BatchSink>) = match &cfg.redis_url {
        Some(url) => {
            let redis = RedisBackend::connect(url).await?;
            let sink = RedisQueueSink::new(redis.connection());
            (Arc::new(redis) as Arc<dyn CoordinationBackend>, Arc::new(sink) as Arc<dyn BatchSink>)
        }
        None => {
            tracing::warn!("REDIS_URL not set; lock and pool cache are process-local, tweets are not queued");
            (Arc::new(MemoryBackend::new()) as Arc<dyn CoordinationBackend>, Arc::new(NullSink) as Arc<dyn BatchSink>)
        }
    };

    // --- persistence ---
    let (registry, store): (Arc<dyn AccountRegistry>, Arc<dyn TweetStore>) = match &cfg.database_url {
        Some(url) => {
            let pg = PgStore::connect(url).await?;
            pg.ensure_schema().await?;
            let pg = Arc::new(pg);
            (pg.clone() as Arc<dyn AccountRegistry>, pg as Arc<dyn TweetStore>)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using an empty in-memory store");
            let mem = Arc::new(MemoryStore::new());
            (mem.clone() as Arc<dyn AccountRegistry>, mem as Arc<dyn TweetStore>)
        }
    };

    // --- discovery ---
    let (aggregator, prober) = nitter_harvester::discovery_from_config(&cfg)?;
    tracing::info!(sources = ?aggregator.source_names(), "instance sources configured");
    let cache = Arc::new(
        InstanceCache::new(aggregator, prober, CacheSettings::from_config(&cfg)).with_shared_backend(backend.clone()),
    );

    // --- scheduler ---
    let fetcher = Arc::new(NitterRssFetcher::new(cfg.request_timeout)?);
    let scheduler = Arc::new(CrawlScheduler::new(
        cache.clone(),
        registry,
        store,
        backend,
        fetcher,
        sink,
        SchedulerSettings::from_config(&cfg),
    ));

    // --- ops server ---
    let app = api::router(AppState {
        cache,
        scheduler: scheduler.clone(),
    })
    .merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("binding {}", cfg.bind))?;
    tracing::info!(bind = %cfg.bind, "ops server listening");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = ?e, "ops server stopped");
        }
    });

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = ?e, "ctrl-c handler failed");
            }
        })
        .await;

    server.abort();
    Ok(())
}
