use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{AccountRegistry, Tweet, TweetId, TweetStore, WatchedAccount};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS watched_users (
        username        TEXT PRIMARY KEY,
        priority        INTEGER NOT NULL DEFAULT 0,
        is_active       BOOLEAN NOT NULL DEFAULT TRUE,
        last_crawled_at TIMESTAMPTZ,
        last_tweet_id   BIGINT
     )",
    "ALTER TABLE watched_users ADD COLUMN IF NOT EXISTS last_tweet_id BIGINT",
    "CREATE TABLE IF NOT EXISTS tweets (
        tweet_id     BIGINT PRIMARY KEY,
        author       TEXT NOT NULL,
        content      TEXT NOT NULL,
        published_at TIMESTAMPTZ NOT NULL,
        source_url   TEXT NOT NULL,
        media_urls   TEXT[] NOT NULL DEFAULT '{}',
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
     )",
    "CREATE INDEX IF NOT EXISTS tweets_author_idx ON tweets (author, tweet_id DESC)",
];

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    username: String,
    priority: i32,
    is_active: bool,
    last_crawled_at: Option<DateTime<Utc>>,
}

/// Postgres-backed registry and tweet store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("connecting to postgres")?;
        tracing::info!(target: "store", "postgres connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables if they are missing. Safe to run on every start.
    pub async fn ensure_schema(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("applying schema")?;
        }
        Ok(())
    }
}

fn to_db_id(id: TweetId) -> Result<i64> {
    i64::try_from(id).with_context(|| format!("tweet id {id} out of range"))
}

#[async_trait]
impl AccountRegistry for PgStore {
    async fn list_active(&self) -> Result<Vec<WatchedAccount>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT username, priority, is_active, last_crawled_at
             FROM watched_users
             WHERE is_active = TRUE
             ORDER BY priority DESC, username",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing watched users")?;

        Ok(rows
            .into_iter()
            .map(|r| WatchedAccount {
                username: r.username,
                priority: r.priority,
                is_active: r.is_active,
                last_crawled_at: r.last_crawled_at,
            })
            .collect())
    }
}

#[async_trait]
impl TweetStore for PgStore {
    async fn cursor(&self, account: &str) -> Result<Option<TweetId>> {
        let row: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT last_tweet_id FROM watched_users WHERE username = $1")
                .bind(account)
                .fetch_optional(&self.pool)
                .await
                .context("reading cursor")?;
        Ok(row
            .and_then(|(id,)| id)
            .and_then(|id| u64::try_from(id).ok()))
    }

    async fn insert_if_absent(&self, tweets: &[Tweet]) -> Result<usize> {
        if tweets.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.context("begin insert tx")?;
        let mut inserted = 0u64;
        for t in tweets {
            let res = sqlx::query(
                "INSERT INTO tweets (tweet_id, author, content, published_at, source_url, media_urls)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (tweet_id) DO NOTHING",
            )
            .bind(to_db_id(t.tweet_id)?)
            .bind(&t.author)
            .bind(&t.content)
            .bind(t.published_at)
            .bind(&t.source_url)
            .bind(&t.media_urls)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("inserting tweet {}", t.tweet_id))?;
            inserted += res.rows_affected();
        }
        tx.commit().await.context("commit insert tx")?;
        Ok(inserted as usize)
    }

    async fn advance_cursor(&self, account: &str, id: TweetId) -> Result<()> {
        sqlx::query(
            "UPDATE watched_users
             SET last_tweet_id = GREATEST(COALESCE(last_tweet_id, 0), $2)
             WHERE username = $1",
        )
        .bind(account)
        .bind(to_db_id(id)?)
        .execute(&self.pool)
        .await
        .context("advancing cursor")?;
        Ok(())
    }

    async fn set_last_crawled_at(&self, account: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE watched_users SET last_crawled_at = $2 WHERE username = $1")
            .bind(account)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("updating last_crawled_at")?;
        Ok(())
    }
}
