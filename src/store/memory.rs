use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{sort_by_priority, AccountRegistry, Tweet, TweetId, TweetStore, WatchedAccount};

#[derive(Debug, Default)]
struct Inner {
    accounts: BTreeMap<String, WatchedAccount>,
    cursors: HashMap<String, TweetId>,
    tweets: BTreeMap<TweetId, Tweet>,
}

/// In-process registry + tweet store for dev runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = WatchedAccount>) -> Self {
        let store = Self::new();
        for a in accounts {
            store.upsert_account(a);
        }
        store
    }

    pub fn upsert_account(&self, account: WatchedAccount) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.accounts.insert(account.username.clone(), account);
    }

    pub fn account(&self, username: &str) -> Option<WatchedAccount> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner.accounts.get(username).cloned()
    }

    pub fn tweet_count(&self) -> usize {
        self.inner.lock().expect("memory store poisoned").tweets.len()
    }
}

#[async_trait]
impl AccountRegistry for MemoryStore {
    async fn list_active(&self) -> Result<Vec<WatchedAccount>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut out: Vec<WatchedAccount> = inner.accounts.values().filter(|a| a.is_active).cloned().collect();
        sort_by_priority(&mut out);
        Ok(out)
    }
}

#[async_trait]
impl TweetStore for MemoryStore {
    async fn cursor(&self, account: &str) -> Result<Option<TweetId>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.cursors.get(account).copied())
    }

    async fn insert_if_absent(&self, tweets: &[Tweet]) -> Result<usize> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let mut inserted = 0;
        for t in tweets {
            if !inner.tweets.contains_key(&t.tweet_id) {
                inner.tweets.insert(t.tweet_id, t.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn advance_cursor(&self, account: &str, id: TweetId) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let slot = inner.cursors.entry(account.to_string()).or_insert(id);
        *slot = (*slot).max(id);
        Ok(())
    }

    async fn set_last_crawled_at(&self, account: &str, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        if let Some(a) = inner.accounts.get_mut(account) {
            a.last_crawled_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_orders_by_priority_then_name() {
        let mut idle = WatchedAccount::new("zzz", 10);
        idle.is_active = false;
        let store = MemoryStore::with_accounts([
            WatchedAccount::new("bravo", 1),
            WatchedAccount::new("alpha", 1),
            WatchedAccount::new("top", 5),
            idle,
        ]);
        let names: Vec<String> = store
            .list_active()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.username)
            .collect();
        assert_eq!(names, vec!["top", "alpha", "bravo"]);
    }

    #[tokio::test]
    async fn cursor_only_moves_forward() {
        let store = MemoryStore::new();
        assert_eq!(store.cursor("a").await.unwrap(), None);
        store.advance_cursor("a", 50).await.unwrap();
        store.advance_cursor("a", 40).await.unwrap();
        assert_eq!(store.cursor("a").await.unwrap(), Some(50));
    }
}
