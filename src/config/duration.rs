// src/config/duration.rs
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Parse a human duration: bare integer seconds (`60`) or a suffixed value
/// (`500ms`, `90s`, `5m`, `3h`). Fractions are accepted for s/m/h (`1.5s`).
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        bail!("empty duration");
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num
        .parse()
        .map_err(|_| anyhow!("invalid duration '{raw}'"))?;
    if !value.is_finite() || value < 0.0 {
        bail!("invalid duration '{raw}'");
    }

    let secs = match unit.trim().to_ascii_lowercase().as_str() {
        "ms" => value / 1_000.0,
        "" | "s" | "sec" | "secs" => value,
        "m" | "min" | "mins" => value * 60.0,
        "h" | "hr" | "hrs" => value * 3_600.0,
        other => bail!("unknown duration unit '{other}' in '{raw}'"),
    };
    Duration::try_from_secs_f64(secs).map_err(|e| anyhow!("duration '{raw}' out of range: {e}"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Secs(u64),
    Float(f64),
    Text(String),
}

impl RawDuration {
    fn into_duration(self) -> Result<Duration> {
        match self {
            RawDuration::Secs(n) => Ok(Duration::from_secs(n)),
            RawDuration::Float(f) => {
                Duration::try_from_secs_f64(f).map_err(|e| anyhow!("invalid duration {f}: {e}"))
            }
            RawDuration::Text(s) => parse_duration(&s),
        }
    }
}

pub fn deserialize<'de, D>(d: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    RawDuration::deserialize(d)?
        .into_duration()
        .map_err(serde::de::Error::custom)
}

pub fn deserialize_opt<'de, D>(d: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawDuration>::deserialize(d)?
        .map(RawDuration::into_duration)
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bare_seconds_and_suffixes() {
        assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("3h").unwrap(), Duration::from_secs(10_800));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 1.5s ").unwrap(), Duration::from_millis(1_500));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("10 fortnights").is_err());
        assert!(parse_duration("-5").is_err());
    }

    #[test]
    fn unrepresentable_values_are_errors() {
        assert!(parse_duration("99999999999999999999999").is_err());
        assert!(parse_duration("99999999999999999999999h").is_err());
        assert!(RawDuration::Float(1e30).into_duration().is_err());
        assert!(RawDuration::Float(-1.0).into_duration().is_err());
        assert!(RawDuration::Float(f64::NAN).into_duration().is_err());
    }
}
