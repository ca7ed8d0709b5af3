// src/crawl/gate.rs
//! Cursor-based dedup in front of persistence.
//!
//! Pages arrive newest-first. Everything strictly above the account cursor is
//! fresh; the first id at or below it means we have caught up.

use std::collections::HashSet;

use crate::store::{Tweet, TweetId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateOutcome {
    /// Tweets newer than the cursor, in page order.
    pub fresh: Vec<Tweet>,
    /// The page reached already-stored history; no point in paging further.
    pub cursor_reached: bool,
}

pub fn filter_new(cursor: Option<TweetId>, page: Vec<Tweet>) -> GateOutcome {
    let mut out = GateOutcome::default();
    let mut seen = HashSet::new();
    for tweet in page {
        if cursor.is_some_and(|c| tweet.tweet_id <= c) {
            out.cursor_reached = true;
            break;
        }
        if seen.insert(tweet.tweet_id) {
            out.fresh.push(tweet);
        }
    }
    out
}

/// Drop ids already collected from earlier pages of the same fetch.
pub fn drop_seen(batch: &mut Vec<Tweet>, seen: &mut HashSet<TweetId>) {
    batch.retain(|t| seen.insert(t.tweet_id));
}
