// src/crawl/timeline.rs
//! Fetching one page of an account's timeline from a Nitter endpoint.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::discovery::sources::BROWSER_UA;
use crate::error::FetchError;
use crate::store::Tweet;

/// Response header carrying the pagination cursor for the next (older) page.
const NEXT_CURSOR_HEADER: &str = "min-id";

static RE_STATUS_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/([A-Za-z0-9_]+)/status/(\d+)").expect("status link regex"));
static RE_IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).expect("img regex"));
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelinePage {
    /// Newest first.
    pub tweets: Vec<Tweet>,
    /// Opaque cursor for the next older page, if the endpoint offered one.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait TimelineFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        endpoint: &str,
        account: &str,
        page_cursor: Option<&str>,
    ) -> Result<TimelinePage, FetchError>;
}

/// Reads `{endpoint}/{account}/rss`.
pub struct NitterRssFetcher {
    client: reqwest::Client,
}

impl NitterRssFetcher {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_UA)
            .timeout(request_timeout)
            .build()
            .context("building timeline http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TimelineFetcher for NitterRssFetcher {
    async fn fetch_page(
        &self,
        endpoint: &str,
        account: &str,
        page_cursor: Option<&str>,
    ) -> Result<TimelinePage, FetchError> {
        let url = format!("{}/{}/rss", endpoint.trim_end_matches('/'), account);
        let mut req = self.client.get(&url);
        if let Some(c) = page_cursor {
            req = req.query(&[("cursor", c)]);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let next_cursor = resp
            .headers()
            .get(NEXT_CURSOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let body = resp.text().await?;
        let tweets = parse_feed(account, &body)?;
        Ok(TimelinePage { tweets, next_cursor })
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Parse a Nitter RSS body into tweets, newest first.
///
/// Items without a recognizable status link are skipped. Retweets keep their
/// original author (taken from the link), so `author` may differ from
/// `account`.
pub fn parse_feed(account: &str, xml: &str) -> Result<Vec<Tweet>, FetchError> {
    let t0 = std::time::Instant::now();
    let rss: Rss = from_str(&scrub_html_entities_for_xml(xml)).map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let Some(link) = it.link.as_deref() else { continue };
        let Some(caps) = RE_STATUS_LINK.captures(link) else {
            tracing::debug!(target: "crawl", account, link, "skipping item without status link");
            continue;
        };
        let Ok(tweet_id) = caps[2].parse::<u64>() else { continue };
        let author = caps[1].trim_start_matches('@').to_string();

        let description = it.description.as_deref().unwrap_or_default();
        let media_urls = RE_IMG_SRC
            .captures_iter(description)
            .map(|c| html_escape::decode_html_entities(&c[1]).into_owned())
            .collect();
        let mut content = html_to_text(description);
        if content.is_empty() {
            content = html_to_text(it.title.as_deref().unwrap_or_default());
        }

        out.push(Tweet {
            tweet_id,
            source_url: format!("https://x.com/{author}/status/{tweet_id}"),
            author,
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822).unwrap_or_else(Utc::now),
            content,
            media_urls,
        });
    }
    out.sort_by(|a, b| b.tweet_id.cmp(&a.tweet_id));

    histogram!("crawl_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let odt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}

fn html_to_text(html: &str) -> String {
    let stripped = RE_TAG.replace_all(html, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    RE_WS.replace_all(decoded.trim(), " ").into_owned()
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_stripped_and_decoded() {
        assert_eq!(html_to_text("<p>Hello&amp; <b>world</b></p>"), "Hello& world");
    }

    #[test]
    fn rfc2822_dates_parse_to_utc() {
        let dt = parse_rfc2822("Mon, 22 Dec 2025 09:00:00 GMT").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-12-22T09:00:00+00:00");
    }
}
