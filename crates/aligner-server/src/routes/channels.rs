//! Channel buffer statistics route.

use std::sync::Arc;

use aligner_core::buffer::ChannelStats;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::state::AppState;

/// Create channel router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/channels/{id}/stats", get(channel_stats))
}

/// Live occupancy of a channel's recent-context buffer
pub async fn channel_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChannelStats>, (StatusCode, String)> {
    let stats = state
        .buffer
        .channel_stats(&id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(stats))
}
