//! One discovery + probe cycle; prints the healthy pool fastest first.
//!
//! Usage: `cargo run --bin probe-instances [-- --json]`

use anyhow::{bail, Context, Result};

use nitter_harvester::config::HarvestConfig;
use nitter_harvester::discovery::CandidateInstance;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    nitter_harvester::init_tracing();

    let json = std::env::args().skip(1).any(|a| a == "--json");
    let cfg = HarvestConfig::load().context("loading harvester config")?;
    let (aggregator, prober) = nitter_harvester::discovery_from_config(&cfg)?;

    let candidates: Vec<CandidateInstance> = aggregator
        .collect()
        .await
        .into_iter()
        .map(|(url, origin)| CandidateInstance::unchecked(url, origin))
        .collect();
    let report = prober
        .probe(candidates, cfg.probe_timeout, cfg.probe_concurrency_limit)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.healthy)?);
    } else {
        for inst in &report.healthy {
            println!(
                "{:>6} ms  {}  ({})",
                inst.latency_ms.unwrap_or_default(),
                inst.base_url,
                inst.origin_source
            );
        }
        for (url, why) in &report.unhealthy {
            eprintln!("   down  {url}: {why}");
        }
    }

    if report.is_exhausted() {
        bail!("no healthy instance found");
    }
    Ok(())
}
