//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version, uptime, config source metadata, the proxy endpoint, and
//! cumulative request and rewrite statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub proxy_path: String,
    pub timeout_ms: u64,
    pub user_agents: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_proxied: u64,
    pub requests_failed: u64,
    pub responses_rewritten: u64,
    pub unresolved_references: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = &state.config;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: format!(
            "{} ({})",
            env!("FRAMEGATE_GIT_SHORT"),
            env!("FRAMEGATE_BUILD_PROFILE")
        ),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source: state.source_name.clone(),
            version: state.version.short(),
            proxy_path: config.proxy.path.clone(),
            timeout_ms: config.upstream.timeout_ms,
            user_agents: state.user_agents.len(),
        },
        stats: StatsResponse {
            requests_proxied: state.stats.proxied.load(Ordering::Relaxed),
            requests_failed: state.stats.failed.load(Ordering::Relaxed),
            responses_rewritten: state.stats.rewritten.load(Ordering::Relaxed),
            unresolved_references: state.stats.unresolved.load(Ordering::Relaxed),
        },
    })
}
