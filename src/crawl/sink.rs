// src/crawl/sink.rs
//! Downstream hand-off of freshly stored tweets.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::store::Tweet;

/// Queue consumed by the downstream processing worker.
pub const PROCESS_QUEUE_KEY: &str = "queue:process";

/// New tweets of one account from one pass, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBatch {
    pub account: String,
    pub tweets: Vec<Tweet>,
}

#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn emit(&self, batch: AccountBatch) -> Result<()>;
}

/// Discards everything.
pub struct NullSink;

#[async_trait]
impl BatchSink for NullSink {
    async fn emit(&self, _batch: AccountBatch) -> Result<()> {
        Ok(())
    }
}

/// Forwards batches to an in-process consumer.
pub struct ChannelSink {
    tx: mpsc::Sender<AccountBatch>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<AccountBatch>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl BatchSink for ChannelSink {
    async fn emit(&self, batch: AccountBatch) -> Result<()> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| anyhow::anyhow!("batch receiver dropped"))
    }
}

/// Pushes each tweet id onto a Redis list for the processing worker.
pub struct RedisQueueSink {
    conn: redis::aio::MultiplexedConnection,
    key: String,
}

impl RedisQueueSink {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self {
            conn,
            key: PROCESS_QUEUE_KEY.to_string(),
        }
    }
}

#[async_trait]
impl BatchSink for RedisQueueSink {
    async fn emit(&self, batch: AccountBatch) -> Result<()> {
        if batch.tweets.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = batch.tweets.iter().map(|t| t.tweet_id.to_string()).collect();
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("RPUSH")
            .arg(&self.key)
            .arg(&ids)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("queueing {} tweets of {}", ids.len(), batch.account))?;
        Ok(())
    }
}
