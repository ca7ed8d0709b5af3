// tests/prober.rs
//
// Probe cycle behavior with a scripted check and tokio's paused clock:
// latency ordering, timeout exclusion, latency ceiling and the concurrency cap.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nitter_harvester::discovery::{CandidateInstance, EndpointCheck, HealthProber};
use nitter_harvester::error::ProbeFailure;

#[derive(Clone, Copy)]
enum Script {
    Healthy(u64),
    Down,
    Hang,
}

struct ScriptedCheck {
    script: HashMap<String, Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedCheck {
    fn new(script: &[(&str, Script)]) -> Self {
        Self {
            script: script.iter().map(|(u, s)| (u.to_string(), *s)).collect(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EndpointCheck for ScriptedCheck {
    async fn check(&self, base_url: &str, _timeout: Duration) -> Result<(), ProbeFailure> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let res = match self.script.get(base_url).copied().unwrap_or(Script::Down) {
            Script::Healthy(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
            Script::Down => Err(ProbeFailure::Status(502)),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        res
    }
}

fn candidates(urls: &[&str]) -> Vec<CandidateInstance> {
    urls.iter().map(|u| CandidateInstance::unchecked(*u, "test")).collect()
}

#[tokio::test(start_paused = true)]
async fn healthy_instances_come_back_fastest_first() {
    let check = Arc::new(ScriptedCheck::new(&[
        ("https://slow", Script::Healthy(900)),
        ("https://fast", Script::Healthy(20)),
        ("https://mid", Script::Healthy(300)),
        ("https://down", Script::Down),
    ]));
    let prober = HealthProber::new(check);

    let report = prober
        .probe(
            candidates(&["https://slow", "https://fast", "https://mid", "https://down"]),
            Duration::from_secs(10),
            20,
        )
        .await;

    let urls: Vec<&str> = report.healthy.iter().map(|c| c.base_url.as_str()).collect();
    assert_eq!(urls, vec!["https://fast", "https://mid", "https://slow"]);
    assert!(report.healthy.iter().all(|c| c.healthy && c.last_checked_at.is_some()));
    assert_eq!(report.healthy[0].latency_ms, Some(20));
    assert_eq!(
        report.unhealthy,
        vec![("https://down".to_string(), ProbeFailure::Status(502))]
    );
}

#[tokio::test(start_paused = true)]
async fn an_endpoint_that_times_out_is_never_in_the_result() {
    let check = Arc::new(ScriptedCheck::new(&[
        ("https://ok", Script::Healthy(50)),
        ("https://stuck", Script::Hang),
    ]));
    let prober = HealthProber::new(check);

    let report = prober
        .probe(candidates(&["https://ok", "https://stuck"]), Duration::from_secs(10), 4)
        .await;

    assert_eq!(report.healthy.len(), 1);
    assert_eq!(report.healthy[0].base_url, "https://ok");
    assert_eq!(
        report.unhealthy,
        vec![("https://stuck".to_string(), ProbeFailure::Timeout(Duration::from_secs(10)))]
    );
}

#[tokio::test(start_paused = true)]
async fn latency_ceiling_drops_slow_but_working_instances() {
    let check = Arc::new(ScriptedCheck::new(&[
        ("https://fast", Script::Healthy(100)),
        ("https://sluggish", Script::Healthy(4_000)),
    ]));
    let prober = HealthProber::new(check).with_max_latency(Some(Duration::from_secs(2)));

    let report = prober
        .probe(candidates(&["https://fast", "https://sluggish"]), Duration::from_secs(10), 2)
        .await;

    assert_eq!(report.healthy.len(), 1);
    assert!(matches!(report.unhealthy[0].1, ProbeFailure::TooSlow(_)));
}

#[tokio::test(start_paused = true)]
async fn no_more_than_the_limit_run_at_once() {
    let urls: Vec<String> = (0..25).map(|i| format!("https://n{i}.example")).collect();
    let script: Vec<(&str, Script)> = urls.iter().map(|u| (u.as_str(), Script::Healthy(100))).collect();
    let check = Arc::new(ScriptedCheck::new(&script));
    let prober = HealthProber::new(check.clone());

    let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let report = prober.probe(candidates(&refs), Duration::from_secs(10), 5).await;

    assert_eq!(report.healthy.len(), 25);
    assert!(check.max_in_flight.load(Ordering::SeqCst) <= 5);
    assert!(check.max_in_flight.load(Ordering::SeqCst) >= 2);
    assert!(!report.is_exhausted());
}

#[tokio::test(start_paused = true)]
async fn everything_down_is_an_exhausted_report() {
    let check = Arc::new(ScriptedCheck::new(&[]));
    let prober = HealthProber::new(check).with_min_healthy(3);
    let report = prober
        .probe(candidates(&["https://a", "https://b"]), Duration::from_secs(1), 2)
        .await;
    assert!(report.is_exhausted());
    assert_eq!(report.unhealthy.len(), 2);
}
