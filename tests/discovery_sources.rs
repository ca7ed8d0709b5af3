// tests/discovery_sources.rs
//
// Source aggregation: status page scraping from a fixture, union across
// sources, origin attribution and tolerance of an empty/failed source.

use async_trait::async_trait;
use std::time::Duration;

use nitter_harvester::discovery::sources::{BuiltinSource, StatusPageSource};
use nitter_harvester::discovery::types::InstanceSource;
use nitter_harvester::discovery::InstanceAggregator;

const STATUS_HTML: &str = include_str!("fixtures/status_page.html");

/// Behaves like a source whose upstream is down: nothing, no error.
struct DeadSource;

#[async_trait]
impl InstanceSource for DeadSource {
    fn name(&self) -> &str {
        "dead"
    }

    async fn fetch(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Upstream that accepts the connection and never answers.
struct HungSource;

#[async_trait]
impl InstanceSource for HungSource {
    fn name(&self) -> &str {
        "hung"
    }

    async fn fetch(&self) -> Vec<String> {
        std::future::pending::<Vec<String>>().await
    }
}

#[test]
fn status_page_fixture_yields_normalized_frontends() {
    let found = StatusPageSource::extract_instances(STATUS_HTML);
    assert_eq!(
        found,
        vec![
            "https://bird.gamma.example:8443",
            "https://github.com",
            "https://nitter.alpha.example",
            "https://nitter.beta.example",
            "https://xcancel.com",
        ]
    );
}

#[tokio::test]
async fn aggregate_is_a_deduplicated_union() {
    let agg = InstanceAggregator::new(vec![
        Box::new(BuiltinSource::new(["https://xcancel.com/", "https://nitter.builtin.example"])),
        Box::new(StatusPageSource::from_fixture_str("fixture", STATUS_HTML)),
        Box::new(DeadSource),
    ]);

    let all = agg.fetch_all().await;
    assert_eq!(all.len(), 6);
    assert!(all.contains("https://nitter.builtin.example"));
    assert!(all.contains("https://nitter.beta.example"));

    // first registered source wins attribution
    let origins = agg.collect().await;
    assert_eq!(origins["https://xcancel.com"], "builtin");
    assert_eq!(origins["https://nitter.alpha.example"], "StatusPage(fixture)");
}

#[tokio::test]
async fn failed_sources_do_not_empty_the_union() {
    let agg = InstanceAggregator::new(vec![Box::new(DeadSource)])
        .with_source(Box::new(BuiltinSource::new(["https://nitter.only.example"])));
    assert_eq!(agg.source_names(), vec!["dead", "builtin"]);

    let all: Vec<String> = agg.fetch_all().await.into_iter().collect();
    assert_eq!(all, vec!["https://nitter.only.example"]);
}

#[tokio::test(start_paused = true)]
async fn hung_source_is_cut_off_at_the_source_timeout() {
    let agg = InstanceAggregator::new(vec![
        Box::new(HungSource),
        Box::new(BuiltinSource::new(["https://nitter.only.example"])),
    ])
    .with_source_timeout(Duration::from_secs(45));

    let started = tokio::time::Instant::now();
    let all = tokio::time::timeout(Duration::from_secs(24 * 3600), agg.fetch_all())
        .await
        .expect("aggregation finishes");
    assert_eq!(all.into_iter().collect::<Vec<_>>(), vec!["https://nitter.only.example"]);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(45) && waited < Duration::from_secs(46), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn hung_source_uses_the_default_limit() {
    let agg = InstanceAggregator::new(vec![Box::new(HungSource)]);
    let started = tokio::time::Instant::now();
    let all = agg.fetch_all().await;
    assert!(all.is_empty());
    let limit = nitter_harvester::discovery::DEFAULT_SOURCE_TIMEOUT;
    let waited = started.elapsed();
    assert!(waited >= limit && waited < limit + Duration::from_secs(1), "{waited:?}");
}
