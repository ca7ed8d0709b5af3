// src/crawl/select.rs
//! Latency-weighted endpoint selection.

use rand::Rng;

use crate::discovery::CandidateInstance;

/// Keeps zero-latency entries finite.
const EPSILON_MS: f64 = 1.0;
/// Weight basis for an instance that somehow carries no measurement.
const UNKNOWN_LATENCY_MS: u64 = 10_000;

pub fn weight(instance: &CandidateInstance) -> f64 {
    let ms = instance.latency_ms.unwrap_or(UNKNOWN_LATENCY_MS) as f64;
    1.0 / (ms + EPSILON_MS)
}

/// Draw one instance with probability proportional to `1 / (latency + ε)`,
/// skipping base URLs listed in `exclude`.
pub fn pick<'a, R: Rng + ?Sized>(
    pool: &'a [CandidateInstance],
    exclude: &[String],
    rng: &mut R,
) -> Option<&'a CandidateInstance> {
    let eligible: Vec<&CandidateInstance> = pool
        .iter()
        .filter(|i| !exclude.iter().any(|e| e == &i.base_url))
        .collect();
    let total: f64 = eligible.iter().map(|i| weight(i)).sum();
    if eligible.is_empty() || total <= 0.0 {
        return None;
    }

    let mut roll = rng.random::<f64>() * total;
    for &inst in &eligible {
        roll -= weight(inst);
        if roll < 0.0 {
            return Some(inst);
        }
    }
    // float rounding
    eligible.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn inst(url: &str, ms: u64) -> CandidateInstance {
        let mut c = CandidateInstance::unchecked(url, "test");
        c.healthy = true;
        c.latency_ms = Some(ms);
        c
    }

    #[test]
    fn excluded_entries_are_never_drawn() {
        let pool = vec![inst("https://a", 10), inst("https://b", 20)];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let got = pick(&pool, &["https://a".to_string()], &mut rng).unwrap();
            assert_eq!(got.base_url, "https://b");
        }
    }

    #[test]
    fn everything_excluded_yields_none() {
        let pool = vec![inst("https://a", 10)];
        let mut rng = StdRng::seed_from_u64(7);
        assert!(pick(&pool, &["https://a".to_string()], &mut rng).is_none());
        assert!(pick(&[], &[], &mut rng).is_none());
    }
}
