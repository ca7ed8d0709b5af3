// tests/weighted_select.rs
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

use nitter_harvester::crawl::select::pick;
use nitter_harvester::discovery::CandidateInstance;

fn healthy(url: &str, ms: u64) -> CandidateInstance {
    let mut c = CandidateInstance::unchecked(url, "test");
    c.healthy = true;
    c.latency_ms = Some(ms);
    c
}

#[test]
fn fast_instances_win_but_slow_ones_still_get_traffic() {
    let pool = vec![
        healthy("https://fast", 10),
        healthy("https://mid", 100),
        healthy("https://slow", 1000),
    ];
    let mut rng = StdRng::seed_from_u64(42);
    let mut hits: HashMap<String, usize> = HashMap::new();
    for _ in 0..20_000 {
        let got = pick(&pool, &[], &mut rng).unwrap();
        *hits.entry(got.base_url.clone()).or_default() += 1;
    }

    let fast = hits["https://fast"];
    let mid = hits["https://mid"];
    let slow = hits.get("https://slow").copied().unwrap_or(0);

    // expected shares are roughly 90% / 9% / 1%
    assert!(fast > mid * 5, "fast={fast} mid={mid}");
    assert!(mid > slow * 3, "mid={mid} slow={slow}");
    assert!(slow > 0, "slow instance never drawn");
}

#[test]
fn retry_draws_skip_tried_endpoints() {
    let pool = vec![healthy("https://a", 10), healthy("https://b", 10), healthy("https://c", 10)];
    let mut rng = StdRng::seed_from_u64(1);

    let mut tried: Vec<String> = Vec::new();
    while let Some(next) = pick(&pool, &tried, &mut rng) {
        assert!(!tried.contains(&next.base_url));
        tried.push(next.base_url.clone());
    }
    tried.sort();
    assert_eq!(tried, vec!["https://a", "https://b", "https://c"]);
}
