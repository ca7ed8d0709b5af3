// tests/metrics.rs
//
// The Prometheus recorder is process-global, so this lives in its own test
// binary with a single test.

use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use nitter_harvester::config::HarvestConfig;
use nitter_harvester::discovery::{CandidateInstance, EndpointCheck, HealthProber};
use nitter_harvester::error::ProbeFailure;
use nitter_harvester::metrics::Metrics;

struct HalfDown;

#[async_trait]
impl EndpointCheck for HalfDown {
    async fn check(&self, base_url: &str, _timeout: Duration) -> Result<(), ProbeFailure> {
        if base_url.contains("down") {
            Err(ProbeFailure::Status(500))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn metrics_endpoint_exposes_discovery_series() {
    let metrics = Metrics::init(&HarvestConfig::default()).expect("install recorder");

    let prober = HealthProber::new(Arc::new(HalfDown));
    prober
        .probe(
            vec![
                CandidateInstance::unchecked("https://up.example", "test"),
                CandidateInstance::unchecked("https://down.example", "test"),
            ],
            Duration::from_secs(1),
            2,
        )
        .await;

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = metrics.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    for series in [
        "discovery_probes_total 2",
        "discovery_probe_failures_total 1",
        "crawl_base_interval_secs 60",
        "discovery_pool_ttl_secs 300",
    ] {
        assert!(text.contains(series), "missing `{series}` in:\n{text}");
    }
}
