// src/api.rs
//! Read-only ops surface. Nothing here triggers a refresh or a pass.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::crawl::{CrawlScheduler, PassReport, PassState};
use crate::discovery::{CandidateInstance, InstanceCache, PoolStatus};

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<InstanceCache>,
    pub scheduler: Arc<CrawlScheduler>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/instances", get(instances))
        .route("/status", get(status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct InstancesResp {
    /// `None` until the first refresh has run.
    status: Option<PoolStatus>,
    generated_at: Option<DateTime<Utc>>,
    ttl_secs: Option<u64>,
    instances: Vec<CandidateInstance>,
}

async fn instances(State(state): State<AppState>) -> Json<InstancesResp> {
    let resp = match state.cache.peek() {
        Some(snap) => InstancesResp {
            status: Some(snap.status),
            generated_at: Some(snap.pool.generated_at),
            ttl_secs: Some(snap.pool.ttl.as_secs()),
            instances: snap.pool.instances().to_vec(),
        },
        None => InstancesResp {
            status: None,
            generated_at: None,
            ttl_secs: None,
            instances: Vec::new(),
        },
    };
    Json(resp)
}

#[derive(Serialize)]
struct StatusResp {
    state: PassState,
    last_pass: Option<PassReport>,
}

async fn status(State(state): State<AppState>) -> Json<StatusResp> {
    Json(StatusResp {
        state: state.scheduler.state(),
        last_pass: state.scheduler.last_report(),
    })
}
