// tests/api_http.rs
//
// Ops router exercised in-process via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /instances before and after the first refresh
// - GET /status before and after a pass

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt as _; // for `oneshot`

use nitter_harvester::api::{self, AppState};
use nitter_harvester::backend::MemoryBackend;
use nitter_harvester::crawl::{CrawlScheduler, NullSink, SchedulerSettings, TimelineFetcher, TimelinePage};
use nitter_harvester::discovery::cache::CacheSettings;
use nitter_harvester::discovery::sources::BuiltinSource;
use nitter_harvester::discovery::{EndpointCheck, HealthProber, InstanceAggregator, InstanceCache};
use nitter_harvester::error::{FetchError, ProbeFailure};
use nitter_harvester::store::{MemoryStore, WatchedAccount};

const BODY_LIMIT: usize = 1024 * 1024;

struct Healthy;

#[async_trait]
impl EndpointCheck for Healthy {
    async fn check(&self, _base_url: &str, _timeout: Duration) -> Result<(), ProbeFailure> {
        Ok(())
    }
}

struct EmptyTimeline;

#[async_trait]
impl TimelineFetcher for EmptyTimeline {
    async fn fetch_page(&self, _: &str, _: &str, _: Option<&str>) -> Result<TimelinePage, FetchError> {
        Ok(TimelinePage::default())
    }
}

fn state() -> AppState {
    let agg = InstanceAggregator::new(vec![Box::new(BuiltinSource::new(["https://n1.example"]))]);
    let cache = Arc::new(InstanceCache::new(
        agg,
        HealthProber::new(Arc::new(Healthy)),
        CacheSettings {
            ttl: Duration::from_secs(300),
            stale_ceiling: Duration::from_secs(3600),
            probe_timeout: Duration::from_secs(1),
            probe_concurrency: 4,
        },
    ));
    let store = Arc::new(MemoryStore::with_accounts([WatchedAccount::new("someone", 1)]));
    let scheduler = Arc::new(CrawlScheduler::new(
        cache.clone(),
        store.clone(),
        store,
        Arc::new(MemoryBackend::new()),
        Arc::new(EmptyTimeline),
        Arc::new(NullSink),
        SchedulerSettings {
            base_interval: Duration::from_secs(60),
            per_account_estimate: Duration::from_secs(5),
            inter_account_delay: Duration::ZERO,
            max_fetch_attempts: 3,
            max_pages_per_pass: 1,
            account_concurrency: 1,
            lock_key: "crawl:scheduler".into(),
        },
    ));
    AppState { cache, scheduler }
}

async fn get_json(app: Router, uri: &str) -> Json {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK, "{uri} should be 200");
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_is_ok() {
    let app = api::router(state());
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn instances_reflect_the_cache_without_refreshing_it() {
    let st = state();

    let before = get_json(api::router(st.clone()), "/instances").await;
    assert!(before["status"].is_null());
    assert_eq!(before["instances"].as_array().unwrap().len(), 0);
    assert_eq!(st.cache.probe_cycles(), 0, "GET /instances must not probe");

    st.cache.get_pool(false).await;
    let after = get_json(api::router(st.clone()), "/instances").await;
    assert_eq!(after["status"], "fresh");
    assert_eq!(after["ttl_secs"], 300);
    assert_eq!(after["instances"][0]["base_url"], "https://n1.example");
    assert_eq!(after["instances"][0]["healthy"], true);
}

#[tokio::test]
async fn status_shows_the_last_pass() {
    let st = state();

    let before = get_json(api::router(st.clone()), "/status").await;
    assert_eq!(before["state"], "idle");
    assert!(before["last_pass"].is_null());

    st.scheduler.run_pass().await;
    let after = get_json(api::router(st.clone()), "/status").await;
    assert_eq!(after["last_pass"]["pool_size"], 1);
    assert_eq!(after["last_pass"]["accounts"][0]["account"], "someone");
    assert_eq!(after["last_pass"]["accounts"][0]["result"]["kind"], "up_to_date");
}
