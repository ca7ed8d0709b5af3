// src/store/mod.rs
//! Persistence seams: the watched-account registry and the tweet store.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

/// Numeric status id; newer tweets have larger ids.
pub type TweetId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedAccount {
    pub username: String,
    pub priority: i32,
    pub is_active: bool,
    pub last_crawled_at: Option<DateTime<Utc>>,
}

impl WatchedAccount {
    pub fn new(username: impl Into<String>, priority: i32) -> Self {
        Self {
            username: username.into(),
            priority,
            is_active: true,
            last_crawled_at: None,
        }
    }
}

/// Normalized tweet record handed to persistence and downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    pub tweet_id: TweetId,
    pub author: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub source_url: String,
    pub media_urls: Vec<String>,
}

#[async_trait]
pub trait AccountRegistry: Send + Sync {
    /// Active accounts, priority descending then username ascending.
    async fn list_active(&self) -> Result<Vec<WatchedAccount>>;
}

#[async_trait]
pub trait TweetStore: Send + Sync {
    /// Highest tweet id stored for `account`, if any.
    async fn cursor(&self, account: &str) -> Result<Option<TweetId>>;

    /// Insert tweets, silently skipping ids that already exist.
    /// Returns how many rows were actually new.
    async fn insert_if_absent(&self, tweets: &[Tweet]) -> Result<usize>;

    /// Move the cursor forward to `id`. Never moves it backwards.
    async fn advance_cursor(&self, account: &str, id: TweetId) -> Result<()>;

    async fn set_last_crawled_at(&self, account: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Sort the way the registry contract requires.
pub(crate) fn sort_by_priority(accounts: &mut [WatchedAccount]) {
    accounts.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.username.cmp(&b.username))
    });
}
