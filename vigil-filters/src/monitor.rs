//! Monitoring endpoint
//!
//! Optional HTTP surface reporting liveness and session/cache counters.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use vigil_common::session::SessionManager;
use vigil_common::ResultCache;

/// State shared by the monitoring handlers
#[derive(Clone)]
pub struct MonitorState {
    pub filter: String,
    pub sessions: Arc<SessionManager>,
    pub cache: Arc<ResultCache>,
    pub startup_time: DateTime<Utc>,
}

impl MonitorState {
    pub fn new(filter: &str, sessions: Arc<SessionManager>, cache: Arc<ResultCache>) -> Self {
        Self {
            filter: filter.to_string(),
            sessions,
            cache,
            startup_time: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub filter: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub active_sessions: usize,
    pub sessions_total: u64,
    pub cache_entries: usize,
    pub cache_capacity: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// GET /health
pub async fn health(State(state): State<MonitorState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    Json(HealthResponse {
        status: "ok".to_string(),
        filter: state.filter.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime.num_seconds().max(0) as u64,
    })
}

/// GET /stats
pub async fn stats(State(state): State<MonitorState>) -> Json<StatsResponse> {
    let cache = state.cache.stats();
    Json(StatsResponse {
        active_sessions: state.sessions.active_sessions(),
        sessions_total: state.sessions.total_sessions(),
        cache_entries: cache.entries,
        cache_capacity: cache.capacity,
        cache_hits: cache.hits,
        cache_misses: cache.misses,
    })
}

pub fn build_router(state: MonitorState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}
