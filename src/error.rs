// src/error.rs
//! Typed failure values consumed by the discovery and crawl loops.
//!
//! Anything that can happen to a single endpoint or a single account is a
//! value here, never a panic or an early return out of the loop. Startup and
//! collaborator plumbing use `anyhow` instead.

use std::time::Duration;

/// Why one candidate endpoint was excluded from the current pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("response does not look like a Nitter front-end")]
    NotAFrontend,
    #[error("answered in {0:?}, over the latency limit")]
    TooSlow(Duration),
}

/// Failure of a single timeline fetch against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint answered with status {0}")]
    Status(u16),
    #[error("could not parse timeline: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(s) => FetchError::Status(s.as_u16()),
            None => FetchError::Transport(e.to_string()),
        }
    }
}

/// Coordination backend (lock + shared cache) failure.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}
