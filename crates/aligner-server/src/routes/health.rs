//! Health check endpoint.

use std::sync::Arc;

use aligner_core::pipeline::StatsSnapshot;
use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
    pub pipeline: StatsSnapshot,
}

#[derive(Serialize)]
pub struct HealthComponents {
    pub database: bool,
    pub llm_configured: bool,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let db_healthy = state.db.ping().is_ok();

    let status = if db_healthy { "healthy" } else { "degraded" };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: HealthComponents {
            database: db_healthy,
            llm_configured: state.config.llm.is_some(),
        },
        pipeline: state.pipeline.stats(),
    })
}
