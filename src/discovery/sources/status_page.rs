use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::collections::BTreeSet;
use std::time::Duration;

use super::BROWSER_UA;
use crate::discovery::{normalize_base_url, record_source_error, types::InstanceSource};

/// Keywords that mark a link as pointing at a Twitter front-end.
const FRONTEND_KEYWORDS: [&str; 4] = ["nitter", "twitter", "bird", "xcancel"];

static RE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("href regex"));

/// Scrapes instance links out of an HTML status/uptime page.
pub struct StatusPageSource {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
        retries: usize,
        retry_delay: Duration,
    },
}

impl StatusPageSource {
    pub fn from_url(url: &str, timeout: Duration, retries: usize, retry_delay: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_UA)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("building status page http client")?;
        Ok(Self {
            name: format!("StatusPage({url})"),
            mode: Mode::Http {
                url: url.to_string(),
                client,
                retries: retries.max(1),
                retry_delay,
            },
        })
    }

    /// Parse a pre-fetched page body instead of going to the network.
    pub fn from_fixture_str(label: &str, html: &str) -> Self {
        Self {
            name: format!("StatusPage({label})"),
            mode: Mode::Fixture(html.to_string()),
        }
    }

    /// All distinct front-end base URLs linked from `html`.
    pub fn extract_instances(html: &str) -> Vec<String> {
        let mut out = BTreeSet::new();
        for caps in RE_HREF.captures_iter(html) {
            let href = html_escape::decode_html_entities(&caps[1]).to_string();
            if !looks_like_frontend_link(&href) {
                continue;
            }
            let lower = href.to_ascii_lowercase();
            if !(lower.starts_with("http://") || lower.starts_with("https://")) {
                continue;
            }
            if let Some(base) = normalize_base_url(&href) {
                out.insert(base);
            }
        }
        out.into_iter().collect()
    }

    async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String> {
        let resp = client
            .get(url)
            .send()
            .await
            .context("status page get()")?
            .error_for_status()
            .context("status page status")?;
        resp.text().await.context("status page .text()")
    }
}

fn looks_like_frontend_link(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    FRONTEND_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[async_trait]
impl InstanceSource for StatusPageSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Vec<String> {
        match &self.mode {
            Mode::Fixture(html) => Self::extract_instances(html),
            Mode::Http {
                url,
                client,
                retries,
                retry_delay,
            } => {
                for attempt in 1..=*retries {
                    match Self::fetch_page(client, url).await {
                        Ok(body) => {
                            let found = Self::extract_instances(&body);
                            tracing::info!(target: "discovery", source = %self.name, found = found.len(), "status page scraped");
                            return found;
                        }
                        Err(e) => {
                            tracing::warn!(
                                target: "discovery",
                                source = %self.name,
                                attempt,
                                retries = *retries,
                                error = %format!("{e:#}"),
                                "status page fetch failed"
                            );
                            if attempt < *retries {
                                tokio::time::sleep(*retry_delay).await;
                            }
                        }
                    }
                }
                tracing::error!(target: "discovery", source = %self.name, "status page unavailable after retries");
                record_source_error(&self.name);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_only_frontend_links() {
        let html = r#"
            <a href="https://nitter.example.org/">nitter.example.org</a>
            <a href='https://xcancel.com/about'>xcancel</a>
            <a href="https://github.com/zedeus/nitter">source</a>
            <a href="/relative/nitter">relative</a>
            <a href="https://example.com/">unrelated</a>
        "#;
        let out = StatusPageSource::extract_instances(html);
        assert_eq!(
            out,
            vec![
                "https://github.com".to_string(),
                "https://nitter.example.org".to_string(),
                "https://xcancel.com".to_string(),
            ]
        );
    }
}
